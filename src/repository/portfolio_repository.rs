// 钱包与手动持仓数据访问 Repository

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::{
    domain::models::{
        CreatePositionParams, CreateWalletParams, ManualPosition, UpdatePositionParams,
        UpdateWalletParams, Wallet,
    },
    error::RepositoryError,
};

pub type RepoResult<T> = std::result::Result<T, RepositoryError>;

// ============ Repository Trait ============

#[async_trait]
pub trait WalletRepository: Send + Sync {
    /// 用户的全部钱包（按创建时间排序）
    async fn list_wallets(&self, user_id: Uuid) -> RepoResult<Vec<Wallet>>;

    async fn get_wallet(&self, wallet_id: Uuid) -> RepoResult<Wallet>;

    /// 同一用户下 (链, 地址) 唯一
    async fn create_wallet(&self, params: CreateWalletParams) -> RepoResult<Wallet>;

    async fn update_wallet(&self, wallet_id: Uuid, params: UpdateWalletParams) -> RepoResult<Wallet>;

    /// 替换密文（None 表示移除助记词）
    async fn replace_secret(&self, wallet_id: Uuid, blob: Option<String>) -> RepoResult<()>;

    async fn delete_wallet(&self, wallet_id: Uuid) -> RepoResult<()>;
}

#[async_trait]
pub trait PositionRepository: Send + Sync {
    async fn list_positions(&self, user_id: Uuid) -> RepoResult<Vec<ManualPosition>>;

    async fn create_position(&self, params: CreatePositionParams) -> RepoResult<ManualPosition>;

    async fn update_position(
        &self,
        position_id: Uuid,
        params: UpdatePositionParams,
    ) -> RepoResult<ManualPosition>;

    async fn delete_position(&self, position_id: Uuid) -> RepoResult<()>;
}

// ============ 内存实现 ============

/// 内存 Repository（CLI 与测试使用）
#[derive(Default)]
pub struct InMemoryPortfolioRepository {
    wallets: RwLock<Vec<Wallet>>,
    positions: RwLock<HashMap<Uuid, ManualPosition>>,
}

impl InMemoryPortfolioRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

fn same_wallet(w: &Wallet, user_id: Uuid, chain: &str, address: &str) -> bool {
    w.user_id == user_id && w.chain.eq_ignore_ascii_case(chain) && w.address == address
}

#[async_trait]
impl WalletRepository for InMemoryPortfolioRepository {
    async fn list_wallets(&self, user_id: Uuid) -> RepoResult<Vec<Wallet>> {
        let wallets = self.wallets.read().await;
        Ok(wallets.iter().filter(|w| w.user_id == user_id).cloned().collect())
    }

    async fn get_wallet(&self, wallet_id: Uuid) -> RepoResult<Wallet> {
        self.wallets
            .read()
            .await
            .iter()
            .find(|w| w.id == wallet_id)
            .cloned()
            .ok_or_else(|| RepositoryError::NotFound(format!("wallet {}", wallet_id)))
    }

    async fn create_wallet(&self, params: CreateWalletParams) -> RepoResult<Wallet> {
        let mut wallets = self.wallets.write().await;
        if wallets
            .iter()
            .any(|w| same_wallet(w, params.user_id, &params.chain, &params.address))
        {
            return Err(RepositoryError::Conflict(format!(
                "wallet {} on {} already exists",
                params.address, params.chain
            )));
        }

        let wallet = Wallet {
            id: Uuid::new_v4(),
            user_id: params.user_id,
            name: params.name,
            chain: params.chain,
            address: params.address,
            encrypted_secret: params.encrypted_secret,
            note: params.note,
            created_at: Utc::now(),
        };
        wallets.push(wallet.clone());
        Ok(wallet)
    }

    async fn update_wallet(&self, wallet_id: Uuid, params: UpdateWalletParams) -> RepoResult<Wallet> {
        let mut wallets = self.wallets.write().await;
        let current = wallets
            .iter()
            .find(|w| w.id == wallet_id)
            .cloned()
            .ok_or_else(|| RepositoryError::NotFound(format!("wallet {}", wallet_id)))?;

        let chain = params.chain.unwrap_or(current.chain);
        let address = params.address.unwrap_or(current.address);
        if wallets
            .iter()
            .any(|w| w.id != wallet_id && same_wallet(w, current.user_id, &chain, &address))
        {
            return Err(RepositoryError::Conflict(format!(
                "wallet {} on {} already exists",
                address, chain
            )));
        }

        let wallet = wallets
            .iter_mut()
            .find(|w| w.id == wallet_id)
            .ok_or_else(|| RepositoryError::NotFound(format!("wallet {}", wallet_id)))?;
        wallet.chain = chain;
        wallet.address = address;
        if let Some(name) = params.name {
            wallet.name = name;
        }
        if params.note.is_some() {
            wallet.note = params.note;
        }
        Ok(wallet.clone())
    }

    async fn replace_secret(&self, wallet_id: Uuid, blob: Option<String>) -> RepoResult<()> {
        let mut wallets = self.wallets.write().await;
        let wallet = wallets
            .iter_mut()
            .find(|w| w.id == wallet_id)
            .ok_or_else(|| RepositoryError::NotFound(format!("wallet {}", wallet_id)))?;
        wallet.encrypted_secret = blob;
        Ok(())
    }

    async fn delete_wallet(&self, wallet_id: Uuid) -> RepoResult<()> {
        let mut wallets = self.wallets.write().await;
        let before = wallets.len();
        wallets.retain(|w| w.id != wallet_id);
        if wallets.len() == before {
            return Err(RepositoryError::NotFound(format!("wallet {}", wallet_id)));
        }
        Ok(())
    }
}

#[async_trait]
impl PositionRepository for InMemoryPortfolioRepository {
    async fn list_positions(&self, user_id: Uuid) -> RepoResult<Vec<ManualPosition>> {
        let positions = self.positions.read().await;
        let mut list: Vec<ManualPosition> = positions
            .values()
            .filter(|p| p.user_id == user_id)
            .cloned()
            .collect();
        list.sort_by(|a, b| a.name.cmp(&b.name).then(a.id.cmp(&b.id)));
        Ok(list)
    }

    async fn create_position(&self, params: CreatePositionParams) -> RepoResult<ManualPosition> {
        let position = ManualPosition {
            id: Uuid::new_v4(),
            user_id: params.user_id,
            asset_class: params.asset_class,
            name: params.name,
            ticker: params.ticker,
            quantity: params.quantity,
            unit_cost: params.unit_cost,
            weight_unit: params.weight_unit,
            notes: params.notes,
        };
        self.positions
            .write()
            .await
            .insert(position.id, position.clone());
        Ok(position)
    }

    async fn update_position(
        &self,
        position_id: Uuid,
        params: UpdatePositionParams,
    ) -> RepoResult<ManualPosition> {
        let mut positions = self.positions.write().await;
        let position = positions
            .get_mut(&position_id)
            .ok_or_else(|| RepositoryError::NotFound(format!("position {}", position_id)))?;

        if let Some(name) = params.name {
            position.name = name;
        }
        if params.ticker.is_some() {
            position.ticker = params.ticker;
        }
        if let Some(quantity) = params.quantity {
            position.quantity = quantity;
        }
        if let Some(unit_cost) = params.unit_cost {
            position.unit_cost = unit_cost;
        }
        if params.weight_unit.is_some() {
            position.weight_unit = params.weight_unit;
        }
        if params.notes.is_some() {
            position.notes = params.notes;
        }
        Ok(position.clone())
    }

    async fn delete_position(&self, position_id: Uuid) -> RepoResult<()> {
        self.positions
            .write()
            .await
            .remove(&position_id)
            .map(|_| ())
            .ok_or_else(|| RepositoryError::NotFound(format!("position {}", position_id)))
    }
}
