//! Domain 模块
//!
//! 链标识、组合领域模型与时间区间

pub mod chain;
pub mod models;
pub mod time_range;

// 重新导出常用类型
pub use chain::ChainId;
pub use models::{
    AssetClass, CreatePositionParams, CreateWalletParams, ManualPosition, NormalizedBalance,
    TokenHolding, UpdatePositionParams, UpdateWalletParams, Wallet, WeightUnit,
};
pub use time_range::{PricePoint, SampleInterval, TimeRange};
