use crate::synthesis::Stage;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("lexical index error: {0}")]
    Tantivy(#[from] tantivy::TantivyError),

    #[error("background task failed: {0}")]
    Task(#[from] tokio::task::JoinError),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("embedding unavailable: {0}")]
    EmbeddingUnavailable(String),

    #[error("index unavailable: {0}")]
    IndexUnavailable(String),

    #[error("scorer unavailable: {0}")]
    ScorerUnavailable(String),

    #[error("generation failed: {0}")]
    GenerationFailed(String),

    /// A dense or sparse retriever could not reach one of its capabilities.
    #[error("retrieval unavailable: {source}")]
    RetrievalUnavailable { source: Box<Error> },

    /// An external call failed while a synthesis stage was running.
    #[error("{stage} stage failed: {source}")]
    StageFailed { stage: Stage, source: Box<Error> },

    /// A synthesis stage was invoked on a state it cannot accept.
    #[error("invariant violation in {stage} stage: {detail}")]
    InvariantViolation { stage: Stage, detail: String },
}

impl Error {
    /// Wrap a capability failure as a retrieval failure.
    ///
    /// Already-wrapped errors are returned unchanged.
    pub fn retrieval(self) -> Self {
        match self {
            err @ Error::RetrievalUnavailable { .. } => err,
            other => Error::RetrievalUnavailable {
                source: Box::new(other),
            },
        }
    }

    /// Tag an error with the synthesis stage it escaped from.
    ///
    /// Invariant violations are caller bugs and are never re-wrapped.
    pub fn in_stage(self, stage: Stage) -> Self {
        match self {
            err @ (Error::InvariantViolation { .. }
            | Error::StageFailed { .. }) => err,
            other => Error::StageFailed {
                stage,
                source: Box::new(other),
            },
        }
    }

    /// The originating error beneath any retrieval or stage wrappers.
    pub fn root(&self) -> &Error {
        match self {
            Error::RetrievalUnavailable { source }
            | Error::StageFailed { source, .. } => source.root(),
            other => other,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retrieval_wraps_once() {
        let err = Error::IndexUnavailable("down".into()).retrieval().retrieval();

        match &err {
            Error::RetrievalUnavailable { source } => {
                assert!(matches!(**source, Error::IndexUnavailable(_)));
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert_eq!(err.to_string(), "retrieval unavailable: index unavailable: down");
    }

    #[test]
    fn in_stage_keeps_invariant_violations() {
        let err = Error::InvariantViolation {
            stage: Stage::Critique,
            detail: "summary has not been produced".into(),
        }
        .in_stage(Stage::Write);

        assert!(matches!(
            err,
            Error::InvariantViolation {
                stage: Stage::Critique,
                ..
            }
        ));
    }

    #[test]
    fn root_unwraps_nested_wrappers() {
        let err = Error::EmbeddingUnavailable("timeout".into())
            .retrieval()
            .in_stage(Stage::Research);

        assert!(matches!(err, Error::StageFailed { stage: Stage::Research, .. }));
        assert!(matches!(err.root(), Error::EmbeddingUnavailable(_)));
    }
}
