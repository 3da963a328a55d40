/// The kind of error that occurred.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// The content is moderated.
    Moderated,
    /// The model provider is rate limited.
    ///
    /// Errors of this kind are transient, and callers may retry the
    /// request after a delay.
    RateLimitExceeded,
    /// Any other errors.
    Other,
}
