use sea_orm::entity::prelude::*;

use crate::status::PaymentMethodKind;

#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "payment_methods")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub name: String,
    pub kind: String,
}

impl Model {
    /// Unknown kinds are treated as gateway methods, which never skip payment.
    pub fn method_kind(&self) -> PaymentMethodKind {
        self.kind
            .parse()
            .unwrap_or(PaymentMethodKind::GatewayRedirect)
    }
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::order_payments::Entity")]
    OrderPayments,
}

impl Related<super::order_payments::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::OrderPayments.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
