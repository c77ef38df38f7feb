//! Hash codec for vdrive.
//!
//! The [`HashCodec`] owns the mount table that turns a `(volume, path)` pair
//! into an opaque [`NodeHash`](vdrive_types::NodeHash) and back. One codec is
//! shared by every volume of a connector; hashes issued for a volume stop
//! decoding as soon as that volume is unmounted.
//!
//! # Wire form
//!
//! ```text
//! <volume-id>_<base64url-no-pad("/" + canonical path)>
//! ```
//!
//! Volume ids never contain `_`, so the first underscore always separates the
//! two halves, and the URL-safe alphabet keeps `/`, `\`, `.`, `?`, `&` and `#`
//! out of every hash.

pub mod codec;

pub use codec::HashCodec;
