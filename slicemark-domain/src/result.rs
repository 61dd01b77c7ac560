use std::{
    error::Error,
    fmt::{self, Debug, Display, Formatter},
};
use tracing::{error, warn};

/// Coarse classification of what went wrong, callers decide on retries and user feedback
/// based on this.
#[derive(Clone, Copy, Eq, PartialEq, Ord, PartialOrd, Debug, Default)]
pub enum ErrorKind {
    #[default]
    Other,
    /// A request was rejected before it was sent, e.g., an empty session id.
    Precondition,
    /// The drawing surface for an image has not been initialized yet. Retry later.
    NotReady,
    /// Network or file-system failure while talking to an annotation store.
    Transport,
    /// Stored or received data could not be (de)serialized.
    Parse,
}

#[derive(Clone, Eq, PartialEq, Ord, PartialOrd, Debug)]
pub struct SmError {
    kind: ErrorKind,
    msg: String,
}
impl SmError {
    pub fn new(msg: &str) -> SmError {
        SmError {
            kind: ErrorKind::Other,
            msg: msg.to_string(),
        }
    }
    pub fn with_kind(kind: ErrorKind, msg: &str) -> SmError {
        SmError {
            kind,
            msg: msg.to_string(),
        }
    }
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        self.kind
    }
    pub fn msg(&self) -> &str {
        &self.msg
    }
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self.kind, ErrorKind::NotReady | ErrorKind::Transport)
    }
}
impl Display for SmError {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        write!(f, "{:?}: {}", self.kind, self.msg)
    }
}
impl Error for SmError {}
impl From<&str> for SmError {
    fn from(value: &str) -> Self {
        SmError::new(value)
    }
}
/// Result type of slicemark with [`SmError`](SmError) as error type.
pub type SmResult<U> = Result<U, SmError>;

pub fn trace_ok_err<T, E>(x: Result<T, E>) -> Option<T>
where
    E: Debug,
{
    match x {
        Ok(x) => Some(x),
        Err(e) => {
            error!("{e:?}");
            None
        }
    }
}
pub fn trace_ok_warn<T, E>(x: Result<T, E>) -> Option<T>
where
    E: Debug,
{
    match x {
        Ok(x) => Some(x),
        Err(e) => {
            warn!("{e:?}");
            None
        }
    }
}

/// Creates an [`SmError`](SmError) with a formatted message. An optional leading
/// [`ErrorKind`](ErrorKind) followed by `;` sets the kind.
/// ```rust
/// use slicemark_domain::{smerr, ErrorKind, SmError};
/// assert_eq!(smerr!("some error {}", 1), SmError::new("some error 1"));
/// assert_eq!(smerr!(ErrorKind::NotReady; "image {}", 2).kind(), ErrorKind::NotReady);
/// ```
#[macro_export]
macro_rules! smerr {
    ($kind:expr; $s:literal) => {
        $crate::result::SmError::with_kind($kind, format!($s).as_str())
    };
    ($kind:expr; $s:literal, $( $exps:expr ),*) => {
        $crate::result::SmError::with_kind($kind, format!($s, $($exps,)*).as_str())
    };
    ($s:literal) => {
        $crate::result::SmError::new(format!($s).as_str())
    };
    ($s:literal, $( $exps:expr ),*) => {
        $crate::result::SmError::new(format!($s, $($exps,)*).as_str())
    }
}

pub fn to_sm<E: Debug>(e: E) -> SmError {
    smerr!(
        "original error type is '{:?}', error message is '{:?}'",
        std::any::type_name::<E>(),
        e
    )
}

/// Like [`to_sm`](to_sm) but tags the error with a kind.
pub fn to_sm_kind<E: Debug>(kind: ErrorKind) -> impl Fn(E) -> SmError {
    move |e| SmError::with_kind(kind, to_sm(e).msg())
}

#[test]
fn test_kinds() {
    let e = smerr!(ErrorKind::Transport; "connection to {} refused", "localhost");
    assert!(e.is_retryable());
    assert_eq!(e.msg(), "connection to localhost refused");
    assert!(!smerr!("plain").is_retryable());
    let e = to_sm_kind::<&str>(ErrorKind::Parse)("bad json");
    assert_eq!(e.kind(), ErrorKind::Parse);
}
