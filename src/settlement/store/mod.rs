//! 台账存储层
//!
//! repository 定义仓储 trait，mysql / memory 是两套实现

pub mod memory;
pub mod mysql;
pub mod repository;

use std::sync::Arc;

use sqlx::{MySql, Pool};

use memory::MemoryLedger;
use mysql::MysqlLedger;
use repository::{BookingStore, CommissionStore, TransactionStore, VendorStore};

/// 四个仓储的聚合句柄，服务层统一从这里取
#[derive(Clone)]
pub struct Ledger {
    pub bookings: Arc<dyn BookingStore>,
    pub transactions: Arc<dyn TransactionStore>,
    pub commissions: Arc<dyn CommissionStore>,
    pub vendors: Arc<dyn VendorStore>,
}

impl Ledger {
    /// MySQL 后端
    pub fn mysql(pool: Pool<MySql>) -> Self {
        let ledger = Arc::new(MysqlLedger::new(pool));
        Self {
            bookings: ledger.clone(),
            transactions: ledger.clone(),
            commissions: ledger.clone(),
            vendors: ledger,
        }
    }

    /// 内存后端，本地模拟与测试用
    pub fn in_memory() -> Self {
        let ledger = Arc::new(MemoryLedger::new());
        Self {
            bookings: ledger.clone(),
            transactions: ledger.clone(),
            commissions: ledger.clone(),
            vendors: ledger,
        }
    }
}
