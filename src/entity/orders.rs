use sea_orm::entity::prelude::*;

#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "orders")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub user_id: Uuid,
    #[sea_orm(unique)]
    pub sku: String,
    pub shipping_id: Option<Uuid>,
    pub original_total: i64,
    pub discount_code: Option<String>,
    pub discount_amount: i64,
    pub total: i64,
    pub status: String,
    pub created_at: DateTimeWithTimeZone,
    pub updated_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::users::Entity",
        from = "Column::UserId",
        to = "super::users::Column::Id"
    )]
    Users,
    #[sea_orm(
        belongs_to = "super::shipping_addresses::Entity",
        from = "Column::ShippingId",
        to = "super::shipping_addresses::Column::Id"
    )]
    ShippingAddresses,
    #[sea_orm(has_many = "super::order_items::Entity")]
    OrderItems,
    #[sea_orm(has_one = "super::order_payments::Entity")]
    OrderPayments,
    #[sea_orm(has_many = "super::refund_requests::Entity")]
    RefundRequests,
}

impl Related<super::users::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Users.def()
    }
}

impl Related<super::shipping_addresses::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::ShippingAddresses.def()
    }
}

impl Related<super::order_items::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::OrderItems.def()
    }
}

impl Related<super::order_payments::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::OrderPayments.def()
    }
}

impl Related<super::refund_requests::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::RefundRequests.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
