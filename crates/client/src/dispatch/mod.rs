//! Character-facing facade over a live session.

mod character;
mod router;

pub use character::CharacterSession;
pub use router::SessionRouter;
