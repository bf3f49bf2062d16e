//! Whiteboard geometry, action protocol and canvas execution.
//!
//! The remote tutor manipulates a shared board by emitting
//! [`WhiteboardAction`]s. They are decoded by [`decoder`], clamped by
//! [`validate`] and applied by [`CanvasExecutor`]; the curve engine and
//! glyph generators turn abstract math into bounded pixel paths.

pub mod bounds;
pub mod coords;
pub mod cursor;
pub mod curves;
pub mod decoder;
pub mod executor;
pub mod expr;
pub mod protocol;
pub mod session;
pub mod surface;
pub mod symbols;
pub mod tools;
pub mod validate;

pub use bounds::{Point, Rect, SafeBounds};
pub use cursor::{CursorActivity, CursorController};
pub use decoder::{BatchDecoded, StreamingDecoder, decode_batch, encode_batch};
pub use executor::{ActionOutcome, CanvasExecutor};
pub use protocol::{ActionKind, ProtocolError, WhiteboardAction};
pub use session::CanvasSession;
pub use surface::{CanvasElement, CanvasSurface, ExportedImage};
pub use validate::{ValidatedAction, validate};
