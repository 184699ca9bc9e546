//! # paysettle-ledger
//!
//! **Ledger plane**: wallet custody, escrow holds, withdrawal methods and the
//! invariants that keep them honest.
//!
//! ## Architecture
//!
//! 1. **LedgerStore**: wallets and transactions; every mutation runs in an
//!    atomic multi-wallet unit with lazy clearing of matured credits
//! 2. **EscrowBook**: funds held per milestone, settled exactly once
//! 3. **MethodBook**: withdrawal methods with a single default per owner
//! 4. **IdempotencyGuard**: replay protection for keyed operations
//! 5. **FundsConservation**: deposits − payouts == custody + escrow
//!
//! ```text
//! Controller → EscrowBook.settle() → LedgerStore.atomic() → LedgerUnit ops → commit
//! ```

pub mod conservation;
pub mod escrow;
pub mod idempotency;
pub mod methods;
pub mod store;

pub use conservation::FundsConservation;
pub use escrow::EscrowBook;
pub use idempotency::IdempotencyGuard;
pub use methods::MethodBook;
pub use store::{LedgerStore, LedgerUnit, WalletRecord};
