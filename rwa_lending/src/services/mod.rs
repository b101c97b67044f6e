pub mod assets;
pub mod loans;

pub use assets::{AssetRegistry, TokenizationRequest};
pub use loans::{LoanLedger, NewLoan};
