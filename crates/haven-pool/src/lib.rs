//! Transaction memory pool for the Haven chain: admission, key-image and
//! fee-density indices, lifecycle maintenance, relay bookkeeping, and the
//! block-template filler.

pub mod chain;
pub mod meta;
pub mod pool;

pub use chain::{ChainBackend, ChainError, LockedTxn, RingVerifier, TxVerificationContext};
pub use meta::{FeeOrderKey, RelayCategory, RelayMethod, TxPoolMeta, NEVER_RELAYED};
pub use pool::{
    BlockTemplate, Clock, PoolError, SystemClock, TakenTx, TxBacklogEntry, TxDetails,
    TxMemoryPool, TxPoolStats,
};
