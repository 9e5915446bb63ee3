use thiserror::Error;

/// Failure of an outbound call (sandbox, classifier, judge).
///
/// None of these are fatal to a stage; each call site maps them onto its
/// own degrade policy.
#[derive(Debug, Error)]
pub enum ExternalError {
    #[error("{service} is not configured")]
    NotConfigured { service: &'static str },
    #[error("{service} did not answer within {seconds}s")]
    Timeout { service: &'static str, seconds: u64 },
    #[error("{service} returned HTTP {status}: {body}")]
    Http {
        service: &'static str,
        status: u16,
        body: String,
    },
    #[error("{service} returned a malformed response: {reason}")]
    Malformed { service: &'static str, reason: String },
    #[error("{service} transport error: {source}")]
    Transport {
        service: &'static str,
        #[source]
        source: reqwest::Error,
    },
}

impl ExternalError {
    pub fn service(&self) -> &'static str {
        match self {
            ExternalError::NotConfigured { service }
            | ExternalError::Timeout { service, .. }
            | ExternalError::Http { service, .. }
            | ExternalError::Malformed { service, .. }
            | ExternalError::Transport { service, .. } => service,
        }
    }
}

/// Run `future` under a timeout, mapping expiry onto `ExternalError::Timeout`
pub async fn with_timeout<T, F>(service: &'static str, seconds: u64, future: F) -> Result<T, ExternalError>
where
    F: std::future::Future<Output = Result<T, ExternalError>>,
{
    match tokio::time::timeout(std::time::Duration::from_secs(seconds), future).await {
        Ok(result) => result,
        Err(_) => Err(ExternalError::Timeout { service, seconds }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_messages_name_the_service() {
        let err = ExternalError::Http {
            service: "sandbox",
            status: 503,
            body: "busy".to_string(),
        };
        assert_eq!(err.to_string(), "sandbox returned HTTP 503: busy");
        assert_eq!(err.service(), "sandbox");
        assert_eq!(
            ExternalError::NotConfigured { service: "judge" }.to_string(),
            "judge is not configured"
        );
    }

    #[tokio::test]
    async fn test_with_timeout_expires() {
        let result: Result<(), ExternalError> = with_timeout("classifier", 0, async {
            tokio::time::sleep(std::time::Duration::from_millis(50)).await;
            Ok(())
        })
        .await;
        assert!(matches!(result, Err(ExternalError::Timeout { service: "classifier", seconds: 0 })));
    }

    #[tokio::test]
    async fn test_with_timeout_passes_result_through() {
        let result = with_timeout("judge", 5, async { Ok::<_, ExternalError>(7) }).await;
        assert_eq!(result.unwrap(), 7);
    }
}
