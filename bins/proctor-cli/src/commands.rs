// CLI commands: offline analysis on local files and assessment import
use anyhow::{Context, Result, bail};
use proctor_analysis::comparator::OutputComparator;
use proctor_analysis::similarity::{similarity_breakdown, SimilarityWeights};
use proctor_analysis::authorship;
use proctor_common::config::Config;
use proctor_common::redis;
use proctor_common::types::{Assessment, Language};
use std::fs;
use std::path::Path;

fn parse_language(name: &str) -> Result<Language> {
    Language::from_str(name)
        .ok_or_else(|| anyhow::anyhow!("Unsupported language '{}'", name))
}

/// Guess the language from a file extension
fn infer_language(path: &str) -> Result<Language> {
    let ext = Path::new(path)
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or_default()
        .to_lowercase();

    match ext.as_str() {
        "py" => Ok(Language::Python),
        "js" | "mjs" => Ok(Language::Javascript),
        "java" => Ok(Language::Java),
        "cpp" | "cc" | "cxx" | "hpp" => Ok(Language::Cpp),
        "c" | "h" => Ok(Language::C),
        _ => bail!("Cannot infer language of '{}'; pass --language", path),
    }
}

fn language_for(path: &str, explicit: Option<&str>) -> Result<Language> {
    match explicit {
        Some(name) => parse_language(name),
        None => infer_language(path),
    }
}

/// One shared language wins over per-side languages; missing sides are inferred
fn resolve_languages(
    left: &str,
    right: &str,
    language: Option<&str>,
    left_language: Option<&str>,
    right_language: Option<&str>,
) -> Result<(Language, Language)> {
    if let Some(name) = language {
        let lang = parse_language(name)?;
        return Ok((lang, lang));
    }
    Ok((
        language_for(left, left_language)?,
        language_for(right, right_language)?,
    ))
}

fn read_source(path: &str) -> Result<String> {
    fs::read_to_string(path).with_context(|| format!("Failed to read {}", path))
}

pub fn similarity(
    left: &str,
    right: &str,
    language: Option<&str>,
    left_language: Option<&str>,
    right_language: Option<&str>,
) -> Result<()> {
    let (left_lang, right_lang) =
        resolve_languages(left, right, language, left_language, right_language)?;
    let left_code = read_source(left)?;
    let right_code = read_source(right)?;

    println!("🔍 Comparing {} ({}) with {} ({})", left, left_lang, right, right_lang);
    if left_lang != right_lang {
        println!("\n⚠️  Different languages are never compared; similarity is 0");
    }

    let breakdown = similarity_breakdown(
        &left_code,
        &right_code,
        left_lang,
        right_lang,
        &SimilarityWeights::default(),
    );

    println!("\n{:<18} {:>8}", "SIGNAL", "VALUE");
    println!("{}", "─".repeat(27));
    for (name, value) in [
        ("surface string", breakdown.surface_string),
        ("deep string", breakdown.deep_string),
        ("token jaccard", breakdown.token_jaccard),
        ("fingerprint", breakdown.fingerprint),
        ("levenshtein", breakdown.levenshtein),
        ("trigram", breakdown.trigram),
    ] {
        println!("{:<18} {:>8.3}", name, value);
    }
    println!("\n✅ Similarity: {:.2}%", breakdown.score);

    Ok(())
}

pub fn authorship(file: &str, language: Option<&str>) -> Result<()> {
    let lang = language_for(file, language)?;
    let code = read_source(file)?;
    let analysis = authorship::score(&code, lang);

    println!("🔍 Authorship heuristics for {} ({})", file, lang);
    println!("\n📊 Metrics:");
    println!("  entropy             {:.3}", analysis.metrics.entropy);
    println!("  perplexity          {:.3}", analysis.metrics.perplexity);
    println!("  burstiness          {:.3}", analysis.metrics.burstiness);
    println!("  comment ratio       {:.1}%", analysis.metrics.comment_ratio);
    println!("  vocabulary richness {:.3}", analysis.metrics.vocabulary_richness);

    if analysis.reasons.is_empty() {
        println!("\nNo heuristic triggered.");
    } else {
        println!("\n📋 Triggered:");
        for reason in &analysis.reasons {
            println!("  - {}", reason);
        }
    }
    println!("\n✅ Heuristic score: {:.0}/100", analysis.score);

    Ok(())
}

pub fn compare(actual: &str, expected: &str) {
    let comparator = OutputComparator::default();
    match comparator.matching_strategy(actual, expected) {
        Some(strategy) => println!("✅ Equivalent (strategy: {})", strategy),
        None => println!("❌ Not equivalent"),
    }
}

/// Parse and sanity-check an assessment definition
fn parse_assessment(content: &str) -> Result<Assessment> {
    let assessment: Assessment =
        serde_json::from_str(content).context("Failed to parse assessment JSON")?;

    if assessment.id.trim().is_empty() {
        bail!("Assessment id cannot be empty");
    }
    if assessment.question.trim().is_empty() {
        bail!("Assessment '{}' has no question", assessment.id);
    }
    if !assessment.marks.is_finite() || assessment.marks < 0.0 {
        bail!("Assessment '{}' has invalid marks {}", assessment.id, assessment.marks);
    }
    Ok(assessment)
}

pub async fn import_assessment(file: &str) -> Result<()> {
    let content = read_source(file)?;
    let assessment = parse_assessment(&content)?;

    if assessment.test_cases.is_empty() {
        println!("⚠️  Assessment '{}' has no test cases; every test score will be 0", assessment.id);
    }

    let config = Config::from_env();
    let client = ::redis::Client::open(config.redis_url.as_str())
        .context("Invalid REDIS_URL")?;
    let mut conn = ::redis::aio::ConnectionManager::new(client)
        .await
        .with_context(|| format!("Failed to connect to Redis at {}", config.redis_url))?;

    redis::put_assessment(&mut conn, &assessment)
        .await
        .context("Failed to store assessment")?;

    println!(
        "✅ Imported assessment '{}' ({} test case(s), {} marks)",
        assessment.id,
        assessment.test_cases.len(),
        assessment.marks
    );
    Ok(())
}
