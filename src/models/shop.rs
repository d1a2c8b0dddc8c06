//! 虚拟商店模型

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// 商品类别，同时决定头像装备槽位
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum ShopCategory {
    Hat,
    Outfit,
    Accessory,
    Background,
    Pet,
}

impl ShopCategory {
    pub fn slot(&self) -> &'static str {
        match self {
            ShopCategory::Hat => "hat",
            ShopCategory::Outfit => "outfit",
            ShopCategory::Accessory => "accessory",
            ShopCategory::Background => "background",
            ShopCategory::Pet => "pet",
        }
    }
}

/// 商品
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ShopItem {
    pub id: String,
    pub name: String,
    pub cost: u32,
    pub category: ShopCategory,
}

impl ShopItem {
    pub fn new(id: &str, name: &str, cost: u32, category: ShopCategory) -> Self {
        Self {
            id: id.to_string(),
            name: name.to_string(),
            cost,
            category,
        }
    }
}

/// 购买记录
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Purchase {
    pub id: String,
    pub student_id: String,
    pub item_id: String,
    pub cost: u32,
    pub purchased_at: DateTime<Utc>,
}

impl Purchase {
    pub fn new(student_id: &str, item: &ShopItem) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            student_id: student_id.to_string(),
            item_id: item.id.clone(),
            cost: item.cost,
            purchased_at: Utc::now(),
        }
    }
}
