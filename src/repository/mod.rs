// Repository 抽象层
pub mod portfolio_file;
pub mod portfolio_repository;

pub use portfolio_file::PortfolioFile;
pub use portfolio_repository::{InMemoryPortfolioRepository, PositionRepository, WalletRepository};
