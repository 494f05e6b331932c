/// Errors reported by fallible configuration and verification calls.
///
/// Protocol violations found in the middle of a layout pass are not returned; they are
/// asserted in debug builds and logged, and the pass carries on.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum LayoutError {
    #[error("invalid argument: {0}")]
    InvalidArgument(&'static str),
    #[error("inconsistent state: {0}")]
    InconsistentState(&'static str),
    #[error("gap repair did not converge after {passes} passes")]
    LayoutNonConvergence { passes: usize },
}
