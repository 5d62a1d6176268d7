pub mod colors;
pub mod discount_products;
pub mod discounts;
pub mod order_items;
pub mod order_payments;
pub mod orders;
pub mod payment_methods;
pub mod product_variants;
pub mod products;
pub mod refund_requests;
pub mod shipping_addresses;
pub mod sizes;
pub mod users;

pub use colors::Entity as Colors;
pub use discount_products::Entity as DiscountProducts;
pub use discounts::Entity as Discounts;
pub use order_items::Entity as OrderItems;
pub use order_payments::Entity as OrderPayments;
pub use orders::Entity as Orders;
pub use payment_methods::Entity as PaymentMethods;
pub use product_variants::Entity as ProductVariants;
pub use products::Entity as Products;
pub use refund_requests::Entity as RefundRequests;
pub use shipping_addresses::Entity as ShippingAddresses;
pub use sizes::Entity as Sizes;
pub use users::Entity as Users;
