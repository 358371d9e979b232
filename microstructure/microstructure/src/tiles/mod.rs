//! Reference microtiles.
//!
//! - [`Solid`] - Fills the whole cell; supports closing faces
//! - [`CenterBox`] - Parametrized block centred in the cell

mod center_box;
mod solid;

pub use center_box::CenterBox;
pub use solid::Solid;
