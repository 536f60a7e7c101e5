#![forbid(unsafe_code)]

use thiserror::Error;

/// Errors delivered through a subscriber's `on_error` signal (generic over
/// the source error).
///
/// Notes:
/// - `Source(E)` carries an upstream fetch/operation failure verbatim; the
///   drain task never retries.
/// - `IllegalDemand` is a subscriber protocol violation (`request(0)`) and
///   is always fatal to the stream, never silently ignored.
/// - `AlreadyConsumed` rejects a subscriber to a single-use publisher whose
///   source was already handed to an earlier subscriber.
#[derive(Debug, Error)]
pub enum FlowError<E>
where
    E: std::error::Error + Send + Sync + 'static,
{
    #[error("demand must be positive")]
    IllegalDemand,

    #[error("publisher already consumed")]
    AlreadyConsumed,

    #[error("source error: {0}")]
    Source(#[source] E),
}

/// Result type for `freshet` (generic over source error).
pub type FlowResult<T, E> = Result<T, FlowError<E>>;

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    #[rstest]
    #[case::illegal_demand(FlowError::<std::io::Error>::IllegalDemand, "demand must be positive")]
    #[case::already_consumed(FlowError::<std::io::Error>::AlreadyConsumed, "publisher already consumed")]
    #[test]
    fn test_error_display(#[case] error: FlowError<std::io::Error>, #[case] expected: &str) {
        assert_eq!(error.to_string(), expected);
    }

    #[test]
    fn test_source_error_display() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "cursor gone");
        let err: FlowError<std::io::Error> = FlowError::Source(io_err);
        assert_eq!(err.to_string(), "source error: cursor gone");
    }

    #[test]
    fn test_flow_error_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<FlowError<std::io::Error>>();
    }
}
