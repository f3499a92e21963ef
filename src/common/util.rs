use std::{
    borrow::Cow,
    future::Future,
    sync::Arc,
    task::{Context, Poll},
};

use base64::Engine as _;
use bytes::Bytes;
use crossbeam_utils::sync::{Parker, Unparker};
use futures_util::{pin_mut, task::ArcWake};

// ===============================================================================================
// Futures
// ===============================================================================================
/// Extension trait for efficiently blocking on a future.
#[doc(hidden)]
pub trait Join: Future {
    fn join(self) -> <Self as Future>::Output;
}

impl<F: Future> Join for F {
    fn join(self) -> <Self as Future>::Output {
        struct ThreadWaker(Unparker);

        impl ArcWake for ThreadWaker {
            fn wake_by_ref(arc_self: &Arc<Self>) {
                arc_self.0.unpark();
            }
        }

        let parker = Parker::new();
        let waker = futures_util::task::waker(Arc::new(ThreadWaker(parker.unparker().clone())));
        let mut context = Context::from_waker(&waker);

        let future = self;
        pin_mut!(future);

        loop {
            match future.as_mut().poll(&mut context) {
                Poll::Ready(output) => return output,
                Poll::Pending => parker.park(),
            }
        }
    }
}

// ===============================================================================================
// Bytes
// ===============================================================================================

/// A wrapper around `bytes::Bytes` used for request and response bodies.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BodyBytes(pub Bytes);

impl BodyBytes {
    pub fn to_bytes(&self) -> Bytes {
        self.0.clone()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Converts the bytes to a UTF-8 string. Borrows when the bytes are valid UTF-8 and
    /// replaces invalid sequences with the Unicode replacement character otherwise.
    pub fn to_maybe_lossy_str(&self) -> Cow<'_, str> {
        match std::str::from_utf8(&self.0) {
            Ok(valid_str) => Cow::Borrowed(valid_str),
            Err(_) => Cow::Owned(String::from_utf8_lossy(&self.0).to_string()),
        }
    }
}

impl From<Bytes> for BodyBytes {
    fn from(value: Bytes) -> Self {
        BodyBytes(value)
    }
}

impl From<Vec<u8>> for BodyBytes {
    fn from(value: Vec<u8>) -> Self {
        BodyBytes(Bytes::from(value))
    }
}

impl From<&str> for BodyBytes {
    fn from(value: &str) -> Self {
        BodyBytes(Bytes::copy_from_slice(value.as_bytes()))
    }
}

impl From<String> for BodyBytes {
    fn from(value: String) -> Self {
        BodyBytes(Bytes::from(value))
    }
}

impl AsRef<[u8]> for BodyBytes {
    fn as_ref(&self) -> &[u8] {
        self.0.as_ref()
    }
}

/// Text bodies print as they are, binary bodies as base64.
impl std::fmt::Display for BodyBytes {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match std::str::from_utf8(&self.0) {
            Ok(result) => write!(f, "{}", result),
            Err(_) => write!(
                f,
                "{}",
                base64::engine::general_purpose::STANDARD.encode(&self.0)
            ),
        }
    }
}

pub(crate) fn remove_trailing_linebreak(s: &str) -> &str {
    let s = s.strip_suffix('\n').unwrap_or(s);
    s.strip_suffix('\r').unwrap_or(s)
}
