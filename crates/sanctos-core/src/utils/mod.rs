//! Small shared helpers: canonical JSON digests, URL redaction, header
//! filtering and the clock abstraction.

pub mod canonical_json;
pub mod clock;
pub mod headers;
pub mod redact;

pub use canonical_json::{canonical_sha256_hex, canonical_string, CanonicalError};
pub use clock::{Clock, ManualClock, SharedClock, SystemClock};
pub use headers::{set_header, strip_upstream_headers};
pub use redact::redact_url;
