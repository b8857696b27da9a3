pub mod seller;
pub mod visit;

pub use seller::{Seller, SellerId};
pub use visit::{CloseOutcome, NewVisit, Visit, VisitClosure, VisitId, VisitOutcome};
