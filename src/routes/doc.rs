use utoipa::{
    Modify, OpenApi,
    openapi::{
        self,
        OpenApi as OpenApiSpec,
        security::{HttpAuthScheme, HttpBuilder, SecurityScheme},
    },
};
use utoipa_scalar::{Scalar, Servable};

use crate::{
    dto::{
        auth::{LoginRequest, LoginResponse, RegisterRequest},
        discounts::{CheckDiscountRequest, CreateDiscountRequest, DiscountCheckResponse},
        orders::{
            CheckoutItem, CheckoutRequest, GatewayCallback, GatewayCallbackAck, OrderDetail,
            OrderItemDetail, OrderList, PaymentStatusResponse, PlaceOrderResponse,
        },
        products::{ProductDetail, ProductList},
        refunds::{CreateRefundRequest, RefundDecision, RefundList, RejectRefundRequest},
        shipping::{CreateShippingAddressRequest, ShippingAddressList},
    },
    models::{
        Attribute, Discount, Order, OrderItem, OrderPayment, PaymentMethod, Product,
        ProductVariant, RefundRequest, ShippingAddress, User,
    },
    response::{ApiResponse, Meta},
    routes::{
        admin, auth, discounts, health, orders, params, payments, products as product_routes,
        refunds, shipping,
    },
};

struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut openapi::OpenApi) {
        let components = openapi.components.get_or_insert_with(Default::default);
        components.add_security_scheme(
            "bearer_auth",
            SecurityScheme::Http(
                HttpBuilder::new()
                    .scheme(HttpAuthScheme::Bearer)
                    .bearer_format("JWT")
                    .build(),
            ),
        );
    }
}

#[derive(OpenApi)]
#[openapi(
    paths(
        health::health_check,
        auth::login,
        auth::register,
        product_routes::list_products,
        product_routes::get_product,
        shipping::list_addresses,
        shipping::create_address,
        discounts::check_discount,
        orders::place_order,
        orders::list_orders,
        orders::get_order,
        orders::payment_status,
        payments::zalopay_callback,
        refunds::create_refund_request,
        refunds::list_own,
        admin::list_all_orders,
        admin::get_order_admin,
        admin::update_order_status,
        admin::adjust_inventory,
        admin::create_discount,
        admin::list_refund_requests,
        admin::approve_refund_request,
        admin::reject_refund_request
    ),
    components(
        schemas(
            User,
            Product,
            Attribute,
            ProductVariant,
            Discount,
            PaymentMethod,
            ShippingAddress,
            Order,
            OrderItem,
            OrderPayment,
            RefundRequest,
            RegisterRequest,
            LoginRequest,
            LoginResponse,
            CheckoutItem,
            CheckoutRequest,
            OrderItemDetail,
            OrderDetail,
            OrderList,
            PlaceOrderResponse,
            PaymentStatusResponse,
            GatewayCallback,
            GatewayCallbackAck,
            CheckDiscountRequest,
            DiscountCheckResponse,
            CreateDiscountRequest,
            CreateRefundRequest,
            RejectRefundRequest,
            RefundDecision,
            RefundList,
            CreateShippingAddressRequest,
            ShippingAddressList,
            ProductList,
            ProductDetail,
            admin::UpdateOrderStatusRequest,
            admin::InventoryAdjustRequest,
            params::Pagination,
            params::ProductQuery,
            params::OrderListQuery,
            params::RefundListQuery,
            Meta,
            ApiResponse<ProductList>,
            ApiResponse<ProductDetail>,
            ApiResponse<OrderDetail>,
            ApiResponse<OrderList>,
            ApiResponse<PlaceOrderResponse>,
            ApiResponse<RefundDecision>
        )
    ),
    security(
        ("bearer_auth" = [])
    ),
    modifiers(&SecurityAddon),
    tags(
        (name = "Health", description = "Health check endpoint"),
        (name = "Auth", description = "Authentication endpoints"),
        (name = "Products", description = "Product catalog endpoints"),
        (name = "Shipping", description = "Shipping address endpoints"),
        (name = "Discounts", description = "Discount code endpoints"),
        (name = "Orders", description = "Checkout and order endpoints"),
        (name = "Payments", description = "Payment gateway callbacks"),
        (name = "Refunds", description = "Refund request endpoints"),
        (name = "Admin", description = "Admin endpoints"),
    )
)]
pub struct ApiDoc;

pub fn scalar_docs() -> Scalar<OpenApiSpec> {
    Scalar::with_url("/docs", ApiDoc::openapi())
}
