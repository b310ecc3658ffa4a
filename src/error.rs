use serde::Serialize;

/// App-wide error type. Every fallible function returns `Result<T, AppError>`.
/// Serializes as `{ error, kind }` so dashboard callers get structured messages.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    /// Text-generation backend returned content that is not well-formed JSON
    /// conforming to the expected analysis shape.
    #[error("Analysis format error: {0}")]
    AnalysisFormat(String),

    /// Network/5xx/unexpected status from the text-generation backend.
    /// Authorization failures are special-cased by the analyzer and never
    /// surface through this variant (see `IntentAnalyzer::analyze`).
    #[error("Analysis backend error: {0}")]
    AnalysisBackend(String),

    /// Workflow graph generation returned unparsable content after
    /// code-fence stripping. Not retried automatically.
    #[error("Template synthesis error: {0}")]
    TemplateSynthesis(String),

    /// A named credential could not be created or updated on the engine.
    #[error("Credential resolution error: {0}")]
    CredentialResolution(String),

    /// Workflow create or activate call failed; the engine's status text is
    /// embedded in the message. No automatic rollback.
    #[error("Deployment error: {0}")]
    Deployment(String),

    #[error("Authentication error: {0}")]
    Auth(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Internal(String),
}

/// Dashboard callers consume errors as `{ error: "...", kind: "..." }`.
impl Serialize for AppError {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        use serde::ser::SerializeStruct;
        let mut s = serializer.serialize_struct("AppError", 2)?;
        s.serialize_field("error", &self.to_string())?;
        s.serialize_field(
            "kind",
            match self {
                AppError::AnalysisFormat(_) => "analysis_format",
                AppError::AnalysisBackend(_) => "analysis_backend",
                AppError::TemplateSynthesis(_) => "template_synthesis",
                AppError::CredentialResolution(_) => "credential_resolution",
                AppError::Deployment(_) => "deployment",
                AppError::Auth(_) => "auth",
                AppError::NotFound(_) => "not_found",
                AppError::Validation(_) => "validation",
                AppError::Http(_) => "http",
                AppError::Serde(_) => "serde",
                AppError::Io(_) => "io",
                AppError::Internal(_) => "internal",
            },
        )?;
        s.end()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_serializes_with_kind() {
        let err = AppError::Deployment("engine said no".into());
        let val = serde_json::to_value(&err).unwrap();
        assert_eq!(val["kind"], "deployment");
        assert!(val["error"].as_str().unwrap().contains("engine said no"));
    }

    #[test]
    fn test_taxonomy_kinds_are_distinct() {
        let kinds: Vec<String> = [
            AppError::AnalysisFormat(String::new()),
            AppError::AnalysisBackend(String::new()),
            AppError::TemplateSynthesis(String::new()),
            AppError::CredentialResolution(String::new()),
            AppError::Deployment(String::new()),
        ]
        .iter()
        .map(|e| {
            serde_json::to_value(e).unwrap()["kind"]
                .as_str()
                .unwrap()
                .to_string()
        })
        .collect();
        let unique: std::collections::HashSet<_> = kinds.iter().collect();
        assert_eq!(unique.len(), kinds.len());
    }
}
