//! Message bodies for the two transports.
//!
//! `json` is the KServe v2 inference protocol used over HTTP; `binary` is the
//! `Codec` framing used by the streaming transport. Both directions are
//! implemented so a server can be built from the same types.

pub mod binary;
pub mod json;
