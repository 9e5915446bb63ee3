mod commands;

use clap::{Parser, Subcommand};
use anyhow::Result;

#[derive(Parser)]
#[command(name = "proctor-cli")]
#[command(about = "Proctor CLI - Inspect similarity, authorship and output matching; import assessments", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Compare two source files with the six-signal similarity blend
    Similarity {
        /// First source file
        #[arg(short, long)]
        left: String,

        /// Second source file
        #[arg(short, long)]
        right: String,

        /// Language of both files (inferred from the extension if omitted)
        #[arg(long, conflicts_with_all = ["left_language", "right_language"])]
        language: Option<String>,

        /// Language of the first file
        #[arg(long)]
        left_language: Option<String>,

        /// Language of the second file
        #[arg(long)]
        right_language: Option<String>,
    },

    /// Run the authorship heuristics on a source file
    Authorship {
        /// Source file
        #[arg(short, long)]
        file: String,

        /// Language (inferred from the extension if omitted)
        #[arg(short, long)]
        language: Option<String>,
    },

    /// Check whether program output matches the expected output
    Compare {
        /// Output produced by the program
        #[arg(short, long)]
        actual: String,

        /// Expected output
        #[arg(short, long)]
        expected: String,
    },

    /// Import an assessment definition (JSON) into Redis
    ImportAssessment {
        /// Assessment JSON file
        #[arg(short, long)]
        file: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Similarity {
            left,
            right,
            language,
            left_language,
            right_language,
        } => {
            commands::similarity(
                &left,
                &right,
                language.as_deref(),
                left_language.as_deref(),
                right_language.as_deref(),
            )?;
        }
        Commands::Authorship { file, language } => {
            commands::authorship(&file, language.as_deref())?;
        }
        Commands::Compare { actual, expected } => {
            commands::compare(&actual, &expected);
        }
        Commands::ImportAssessment { file } => {
            commands::import_assessment(&file).await?;
        }
    }

    Ok(())
}
