use sea_orm::entity::prelude::*;

#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "discounts")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    #[sea_orm(unique)]
    pub code: String,
    pub percent: i32,
    pub valid_from: DateTimeWithTimeZone,
    pub valid_to: DateTimeWithTimeZone,
    pub min_order_amount: i64,
    pub usage_limit: i32,
    pub used_count: i32,
    pub created_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::discount_products::Entity")]
    DiscountProducts,
}

impl Related<super::discount_products::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::DiscountProducts.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
