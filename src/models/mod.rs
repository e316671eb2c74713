pub mod checklist;
pub mod damage;
pub mod deduction;
pub mod enums;
pub mod floor_plan;
pub mod lease;
pub mod lenient;
pub mod project;
pub mod quote;

pub use checklist::*;
pub use damage::*;
pub use deduction::*;
pub use enums::*;
pub use floor_plan::*;
pub use lease::*;
pub use project::*;
pub use quote::*;
