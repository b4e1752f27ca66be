pub mod enums;
pub mod filing;
pub mod stage;
pub mod brief;
pub mod ledger;

pub use enums::*;
pub use filing::*;
pub use stage::*;
pub use brief::*;
pub use ledger::*;
