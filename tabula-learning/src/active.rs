//! The active-learning engine: observation table, oracles, hypothesis
//! extraction and the L* controller.

mod lstar;
pub use lstar::*;

pub(crate) mod oracle;
pub use oracle::*;

mod hypothesis;
pub use hypothesis::*;

mod observationtable;
pub use observationtable::*;
