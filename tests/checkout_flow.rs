use std::sync::atomic::{AtomicBool, AtomicI32, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{Duration, Utc};
use sea_orm::ActiveValue::NotSet;
use sea_orm::{ActiveModelTrait, ColumnTrait, EntityTrait, PaginatorTrait, QueryFilter, Set};
use serde_json::json;
use storefront_api::{
    db::{create_orm_conn, create_pool, run_migrations},
    dto::orders::{CheckoutItem, CheckoutRequest, GatewayCallback},
    dto::refunds::{CreateRefundRequest, RejectRefundRequest},
    entity::{
        Discounts, OrderPayments, Orders, ProductVariants, Products, RefundRequests,
        discount_products::ActiveModel as DiscountProductActive,
        discounts::ActiveModel as DiscountActive,
        order_payments::Column as PaymentCol,
        orders::Column as OrderCol,
        payment_methods::ActiveModel as MethodActive,
        product_variants::ActiveModel as VariantActive,
        products::ActiveModel as ProductActive,
        shipping_addresses::ActiveModel as AddressActive,
        users::ActiveModel as UserActive,
    },
    error::AppError,
    gateway::{
        GatewayError, GatewayStatus, InitiatedPayment, PaymentGateway, PaymentInitiation,
        RefundInstruction, RefundOutcome,
    },
    middleware::auth::AuthUser,
    routes::admin::UpdateOrderStatusRequest,
    services::{
        admin_service, discount_service::DiscountRejection, order_service, payment_service,
        refund_service, token_service::TokenService,
    },
    state::AppState,
};
use tokio::sync::OnceCell;
use uuid::Uuid;

// Tests run in parallel; concurrent CREATE TABLE IF NOT EXISTS can still collide.
static MIGRATED: OnceCell<()> = OnceCell::const_new();

/// In-process gateway whose answers are set per test.
struct ScriptedGateway {
    create_code: AtomicI32,
    query_code: AtomicI32,
    refund_code: AtomicI32,
    refund_delay_ms: AtomicU64,
    unreachable: AtomicBool,
    initiations: AtomicUsize,
    queries: AtomicUsize,
    refunds: AtomicUsize,
    refund_references: Mutex<Vec<String>>,
}

impl ScriptedGateway {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            create_code: AtomicI32::new(1),
            query_code: AtomicI32::new(1),
            refund_code: AtomicI32::new(1),
            refund_delay_ms: AtomicU64::new(0),
            unreachable: AtomicBool::new(false),
            initiations: AtomicUsize::new(0),
            queries: AtomicUsize::new(0),
            refunds: AtomicUsize::new(0),
            refund_references: Mutex::new(Vec::new()),
        })
    }

    fn check_reachable(&self) -> Result<(), GatewayError> {
        if self.unreachable.load(Ordering::SeqCst) {
            return Err(GatewayError::Decode("connection reset".into()));
        }
        Ok(())
    }
}

#[async_trait]
impl PaymentGateway for ScriptedGateway {
    async fn initiate_payment(
        &self,
        request: &PaymentInitiation,
    ) -> Result<InitiatedPayment, GatewayError> {
        self.initiations.fetch_add(1, Ordering::SeqCst);
        self.check_reachable()?;
        let return_code = self.create_code.load(Ordering::SeqCst);
        Ok(InitiatedPayment {
            return_code,
            order_url: (return_code == 1).then(|| format!("https://pay.test/{}", request.order_sku)),
            transaction_id: format!("251018_{}", request.order_sku),
            raw: json!({ "return_code": return_code }),
        })
    }

    async fn search_status(&self, _transaction_id: &str) -> Result<GatewayStatus, GatewayError> {
        self.queries.fetch_add(1, Ordering::SeqCst);
        self.check_reachable()?;
        let return_code = self.query_code.load(Ordering::SeqCst);
        Ok(GatewayStatus {
            return_code,
            gateway_reference: (return_code == 1).then(|| "zp-240001".to_string()),
            raw: json!({ "return_code": return_code }),
        })
    }

    async fn refund(&self, request: &RefundInstruction) -> Result<RefundOutcome, GatewayError> {
        self.refunds.fetch_add(1, Ordering::SeqCst);
        self.refund_references
            .lock()
            .unwrap()
            .push(request.refund_reference.clone());
        let delay = self.refund_delay_ms.load(Ordering::SeqCst);
        if delay > 0 {
            tokio::time::sleep(std::time::Duration::from_millis(delay)).await;
        }
        self.check_reachable()?;
        let return_code = self.refund_code.load(Ordering::SeqCst);
        Ok(RefundOutcome {
            return_code,
            accepted: matches!(return_code, 1 | 3),
            raw: json!({ "return_code": return_code }),
        })
    }

    fn verify_callback(&self, _data: &str, mac: &str) -> bool {
        mac == "valid-mac"
    }
}

struct Fixture {
    state: AppState,
    gateway: Arc<ScriptedGateway>,
    customer: AuthUser,
    admin: AuthUser,
    address_id: Uuid,
    cod_method: Uuid,
    gateway_method: Uuid,
}

// Every fixture uses fresh ids and names, so tests can share one database
// and run in parallel.
async fn fixture() -> anyhow::Result<Option<Fixture>> {
    let database_url = match std::env::var("TEST_DATABASE_URL")
        .or_else(|_| std::env::var("DATABASE_URL"))
    {
        Ok(url) => url,
        Err(_) => {
            eprintln!(
                "Skipping test: set TEST_DATABASE_URL or DATABASE_URL to run checkout flow tests."
            );
            return Ok(None);
        }
    };

    MIGRATED
        .get_or_try_init(|| async {
            let orm = create_orm_conn(&database_url).await?;
            run_migrations(&orm).await
        })
        .await?;
    let orm = create_orm_conn(&database_url).await?;
    let pool = create_pool(&database_url).await?;

    let gateway = ScriptedGateway::new();
    let state = AppState {
        pool,
        orm,
        tokens: Arc::new(TokenService::new("test-secret", 1)),
        gateway: gateway.clone(),
    };

    let customer = create_user(&state, "user").await?;
    let admin = create_user(&state, "admin").await?;

    let address_id = AddressActive {
        id: Set(Uuid::new_v4()),
        user_id: Set(customer.user_id),
        recipient_name: Set("Nguyen Van A".into()),
        phone: Set("0900000000".into()),
        address: Set("1 Le Loi, District 1".into()),
        created_at: NotSet,
    }
    .insert(&state.orm)
    .await?
    .id;

    let cod_method = create_method(&state, "cod").await?;
    let gateway_method = create_method(&state, "gateway").await?;

    Ok(Some(Fixture {
        state,
        gateway,
        customer,
        admin,
        address_id,
        cod_method,
        gateway_method,
    }))
}

async fn create_user(state: &AppState, role: &str) -> anyhow::Result<AuthUser> {
    let user = UserActive {
        id: Set(Uuid::new_v4()),
        email: Set(format!("{role}-{}@example.com", Uuid::new_v4())),
        password_hash: Set("dummy".into()),
        name: Set(None),
        role: Set(role.into()),
        created_at: NotSet,
    }
    .insert(&state.orm)
    .await?;

    Ok(AuthUser {
        user_id: user.id,
        role: user.role,
    })
}

async fn create_method(state: &AppState, kind: &str) -> anyhow::Result<Uuid> {
    let method = MethodActive {
        id: Set(Uuid::new_v4()),
        name: Set(format!("{kind}-{}", Uuid::new_v4())),
        kind: Set(kind.into()),
    }
    .insert(&state.orm)
    .await?;
    Ok(method.id)
}

async fn create_product(state: &AppState, price: i64, stock: i32) -> anyhow::Result<Uuid> {
    let product = ProductActive {
        id: Set(Uuid::new_v4()),
        name: Set(format!("Tee {}", Uuid::new_v4())),
        description: Set(None),
        price: Set(price),
        promotional_price: Set(None),
        stock_quantity: Set(stock),
        status: Set("public".into()),
        deleted_at: Set(None),
        created_at: NotSet,
    }
    .insert(&state.orm)
    .await?;
    Ok(product.id)
}

async fn create_variant(state: &AppState, product_id: Uuid, quantity: i32) -> anyhow::Result<Uuid> {
    let variant = VariantActive {
        id: Set(Uuid::new_v4()),
        product_id: Set(product_id),
        size_id: Set(None),
        color_id: Set(None),
        quantity: Set(quantity),
        created_at: NotSet,
    }
    .insert(&state.orm)
    .await?;
    Ok(variant.id)
}

async fn create_discount(
    state: &AppState,
    percent: i32,
    min_order_amount: i64,
    usage_limit: i32,
) -> anyhow::Result<(Uuid, String)> {
    let now = Utc::now();
    let code = format!("SUMMER{}", &Uuid::new_v4().simple().to_string()[..8]).to_uppercase();
    let discount = DiscountActive {
        id: Set(Uuid::new_v4()),
        code: Set(code.clone()),
        percent: Set(percent),
        valid_from: Set((now - Duration::days(1)).into()),
        valid_to: Set((now + Duration::days(30)).into()),
        min_order_amount: Set(min_order_amount),
        usage_limit: Set(usage_limit),
        used_count: Set(0),
        created_at: NotSet,
    }
    .insert(&state.orm)
    .await?;
    Ok((discount.id, code))
}

fn checkout(
    fx: &Fixture,
    product_id: Uuid,
    quantity: i32,
    method: Uuid,
    code: Option<&str>,
) -> CheckoutRequest {
    CheckoutRequest {
        items: vec![CheckoutItem {
            product_id,
            variant_id: None,
            quantity,
        }],
        shipping_id: fx.address_id,
        payment_method_id: method,
        discount_code: code.map(str::to_string),
    }
}

async fn stock_of(state: &AppState, product_id: Uuid) -> anyhow::Result<i32> {
    let product = Products::find_by_id(product_id)
        .one(&state.orm)
        .await?
        .ok_or_else(|| anyhow::anyhow!("product vanished"))?;
    Ok(product.stock_quantity)
}

async fn used_count(state: &AppState, discount_id: Uuid) -> anyhow::Result<i32> {
    let discount = Discounts::find_by_id(discount_id)
        .one(&state.orm)
        .await?
        .ok_or_else(|| anyhow::anyhow!("discount vanished"))?;
    Ok(discount.used_count)
}

async fn orders_of(state: &AppState, user: &AuthUser) -> anyhow::Result<u64> {
    Ok(Orders::find()
        .filter(OrderCol::UserId.eq(user.user_id))
        .count(&state.orm)
        .await?)
}

async fn order_status(state: &AppState, order_id: Uuid) -> anyhow::Result<(String, String)> {
    let order = Orders::find_by_id(order_id)
        .one(&state.orm)
        .await?
        .ok_or_else(|| anyhow::anyhow!("order vanished"))?;
    let payment = OrderPayments::find()
        .filter(PaymentCol::OrderId.eq(order_id))
        .one(&state.orm)
        .await?
        .ok_or_else(|| anyhow::anyhow!("payment vanished"))?;
    Ok((order.status, payment.status))
}

async fn move_order(
    fx: &Fixture,
    user: &AuthUser,
    order_id: Uuid,
    status: &str,
) -> Result<String, AppError> {
    let payload = UpdateOrderStatusRequest {
        status: status.into(),
    };
    let resp = admin_service::update_order_status(&fx.state, user, order_id, payload).await?;
    Ok(resp.data.map(|order| order.status).unwrap_or_default())
}

/// Gateway order that has been paid and reconciled, plus a pending refund
/// request for its full amount.
async fn paid_order_with_refund_request(fx: &Fixture, price: i64) -> anyhow::Result<(Uuid, Uuid)> {
    let product_id = create_product(&fx.state, price, 10).await?;
    let order_id = order_service::place_order(
        &fx.state,
        &fx.customer,
        checkout(fx, product_id, 1, fx.gateway_method, None),
    )
    .await?
    .data
    .expect("placed order")
    .order
    .order
    .id;
    payment_service::reconcile(&fx.state, &fx.customer, order_id).await?;

    let request = refund_service::create_refund_request(
        &fx.state,
        &fx.customer,
        CreateRefundRequest {
            order_id,
            reason: "Not as described".into(),
            amount: price,
            images: None,
            description: None,
        },
    )
    .await?
    .data
    .expect("refund request");
    Ok((order_id, request.id))
}

#[tokio::test]
async fn cod_checkout_applies_discount_and_takes_stock() -> anyhow::Result<()> {
    let Some(fx) = fixture().await? else {
        return Ok(());
    };
    let product_id = create_product(&fx.state, 100_000, 10).await?;
    let (discount_id, code) = create_discount(&fx.state, 10, 100_000, 5).await?;

    let resp = order_service::place_order(
        &fx.state,
        &fx.customer,
        checkout(&fx, product_id, 2, fx.cod_method, Some(&format!("  {code} "))),
    )
    .await?;
    let placed = resp.data.expect("placed order");

    assert_eq!(placed.original_total, 200_000);
    assert_eq!(placed.discount_amount, 20_000);
    assert_eq!(placed.final_total, 180_000);
    assert!(placed.payment_url.is_none());
    assert_eq!(placed.order.order.status, "processing");
    assert_eq!(placed.order.order.discount_code.as_deref(), Some(code.as_str()));
    assert_eq!(placed.order.items.len(), 1);
    assert_eq!(placed.order.items[0].item.price, 100_000);
    let payment = placed.order.payment.expect("payment row");
    assert_eq!(payment.status, "pending");
    assert!(payment.transaction_id.is_none());

    assert_eq!(stock_of(&fx.state, product_id).await?, 8);
    assert_eq!(used_count(&fx.state, discount_id).await?, 1);
    assert_eq!(fx.gateway.initiations.load(Ordering::SeqCst), 0);
    Ok(())
}

#[tokio::test]
async fn fully_discounted_order_is_paid_without_gateway() -> anyhow::Result<()> {
    let Some(fx) = fixture().await? else {
        return Ok(());
    };
    let product_id = create_product(&fx.state, 50_000, 3).await?;
    let (_, code) = create_discount(&fx.state, 100, 0, 1).await?;

    let placed = order_service::place_order(
        &fx.state,
        &fx.customer,
        checkout(&fx, product_id, 1, fx.gateway_method, Some(&code)),
    )
    .await?
    .data
    .expect("placed order");

    assert_eq!(placed.final_total, 0);
    assert_eq!(placed.order.order.status, "completed");
    let payment = placed.order.payment.expect("payment row");
    assert_eq!(payment.status, "paid");
    assert!(payment.paid_at.is_some());
    assert_eq!(fx.gateway.initiations.load(Ordering::SeqCst), 0);
    Ok(())
}

#[tokio::test]
async fn refused_payment_session_leaves_no_trace() -> anyhow::Result<()> {
    let Some(fx) = fixture().await? else {
        return Ok(());
    };
    fx.gateway.create_code.store(0, Ordering::SeqCst);
    let product_id = create_product(&fx.state, 100_000, 10).await?;
    let (discount_id, code) = create_discount(&fx.state, 10, 0, 5).await?;

    let err = order_service::place_order(
        &fx.state,
        &fx.customer,
        checkout(&fx, product_id, 2, fx.gateway_method, Some(&code)),
    )
    .await
    .err()
    .expect("checkout should fail");

    assert!(matches!(err, AppError::PaymentInitiationFailed(0)));
    assert_eq!(fx.gateway.initiations.load(Ordering::SeqCst), 1);
    assert_eq!(orders_of(&fx.state, &fx.customer).await?, 0);
    assert_eq!(stock_of(&fx.state, product_id).await?, 10);
    assert_eq!(used_count(&fx.state, discount_id).await?, 0);
    Ok(())
}

#[tokio::test]
async fn variant_checkout_takes_variant_stock() -> anyhow::Result<()> {
    let Some(fx) = fixture().await? else {
        return Ok(());
    };
    let product_id = create_product(&fx.state, 90_000, 20).await?;
    let variant_id = create_variant(&fx.state, product_id, 3).await?;
    let request = |quantity: i32| CheckoutRequest {
        items: vec![CheckoutItem {
            product_id,
            variant_id: Some(variant_id),
            quantity,
        }],
        shipping_id: fx.address_id,
        payment_method_id: fx.cod_method,
        discount_code: None,
    };

    let placed = order_service::place_order(&fx.state, &fx.customer, request(2))
        .await?
        .data
        .expect("placed order");
    assert_eq!(placed.order.items[0].item.variant_id, Some(variant_id));

    let variant = ProductVariants::find_by_id(variant_id)
        .one(&fx.state.orm)
        .await?
        .expect("variant");
    assert_eq!(variant.quantity, 1);
    assert_eq!(stock_of(&fx.state, product_id).await?, 20);

    let err = order_service::place_order(&fx.state, &fx.customer, request(2))
        .await
        .err()
        .expect("only one left");
    assert!(matches!(
        err,
        AppError::InsufficientStock {
            requested: 2,
            available: 1,
            variant_id: Some(_),
            ..
        }
    ));
    assert_eq!(orders_of(&fx.state, &fx.customer).await?, 1);
    Ok(())
}

#[tokio::test]
async fn unreachable_gateway_at_checkout_leaves_no_trace() -> anyhow::Result<()> {
    let Some(fx) = fixture().await? else {
        return Ok(());
    };
    fx.gateway.unreachable.store(true, Ordering::SeqCst);
    let product_id = create_product(&fx.state, 100_000, 10).await?;
    let (discount_id, code) = create_discount(&fx.state, 10, 0, 5).await?;

    let err = order_service::place_order(
        &fx.state,
        &fx.customer,
        checkout(&fx, product_id, 3, fx.gateway_method, Some(&code)),
    )
    .await
    .err()
    .expect("gateway down");

    assert!(matches!(err, AppError::GatewayCommunication(_)));
    assert_eq!(fx.gateway.initiations.load(Ordering::SeqCst), 1);
    assert_eq!(orders_of(&fx.state, &fx.customer).await?, 0);
    assert_eq!(stock_of(&fx.state, product_id).await?, 10);
    assert_eq!(used_count(&fx.state, discount_id).await?, 0);
    Ok(())
}

#[tokio::test]
async fn rejected_discount_aborts_checkout() -> anyhow::Result<()> {
    let Some(fx) = fixture().await? else {
        return Ok(());
    };
    let product_id = create_product(&fx.state, 100_000, 10).await?;

    let (restricted_id, restricted) = create_discount(&fx.state, 10, 0, 5).await?;
    let other_product = create_product(&fx.state, 100_000, 10).await?;
    DiscountProductActive {
        discount_id: Set(restricted_id),
        product_id: Set(other_product),
    }
    .insert(&fx.state.orm)
    .await?;

    let err = order_service::place_order(
        &fx.state,
        &fx.customer,
        checkout(&fx, product_id, 1, fx.cod_method, Some(&restricted)),
    )
    .await
    .err()
    .expect("discount not applicable");
    assert!(matches!(
        err,
        AppError::DiscountInvalid(DiscountRejection::NotApplicable)
    ));

    let (minimum_id, minimum) = create_discount(&fx.state, 10, 500_000, 5).await?;
    let err = order_service::place_order(
        &fx.state,
        &fx.customer,
        checkout(&fx, product_id, 2, fx.cod_method, Some(&minimum)),
    )
    .await
    .err()
    .expect("below minimum");
    assert!(matches!(
        err,
        AppError::DiscountInvalid(DiscountRejection::BelowMinimum)
    ));

    assert_eq!(orders_of(&fx.state, &fx.customer).await?, 0);
    assert_eq!(stock_of(&fx.state, product_id).await?, 10);
    assert_eq!(used_count(&fx.state, restricted_id).await?, 0);
    assert_eq!(used_count(&fx.state, minimum_id).await?, 0);
    Ok(())
}

#[tokio::test]
async fn insufficient_stock_is_rejected_before_writing() -> anyhow::Result<()> {
    let Some(fx) = fixture().await? else {
        return Ok(());
    };
    let product_id = create_product(&fx.state, 100_000, 1).await?;

    let err = order_service::place_order(
        &fx.state,
        &fx.customer,
        checkout(&fx, product_id, 3, fx.cod_method, None),
    )
    .await
    .err()
    .expect("checkout should fail");

    assert!(matches!(
        err,
        AppError::InsufficientStock {
            requested: 3,
            available: 1,
            ..
        }
    ));
    assert_eq!(orders_of(&fx.state, &fx.customer).await?, 0);
    assert_eq!(stock_of(&fx.state, product_id).await?, 1);
    Ok(())
}

#[tokio::test]
async fn failed_payment_compensates_exactly_once() -> anyhow::Result<()> {
    let Some(fx) = fixture().await? else {
        return Ok(());
    };
    let product_id = create_product(&fx.state, 100_000, 10).await?;
    let (discount_id, code) = create_discount(&fx.state, 10, 0, 5).await?;

    let placed = order_service::place_order(
        &fx.state,
        &fx.customer,
        checkout(&fx, product_id, 2, fx.gateway_method, Some(&code)),
    )
    .await?
    .data
    .expect("placed order");
    assert_eq!(placed.order.order.status, "pending");
    assert!(placed.payment_url.is_some());
    assert_eq!(stock_of(&fx.state, product_id).await?, 8);
    assert_eq!(used_count(&fx.state, discount_id).await?, 1);

    fx.gateway.query_code.store(-54, Ordering::SeqCst);
    let order_id = placed.order.order.id;

    let first = payment_service::reconcile(&fx.state, &fx.customer, order_id)
        .await?
        .data
        .expect("status");
    assert_eq!(first.order_status, "cancelled");
    assert_eq!(first.payment_status, "failed");

    let second = payment_service::reconcile(&fx.state, &fx.customer, order_id)
        .await?
        .data
        .expect("status");
    assert_eq!(second.order_status, "cancelled");
    assert_eq!(second.payment_status, "failed");

    assert_eq!(fx.gateway.queries.load(Ordering::SeqCst), 2);
    assert_eq!(stock_of(&fx.state, product_id).await?, 10);
    assert_eq!(used_count(&fx.state, discount_id).await?, 0);
    Ok(())
}

#[tokio::test]
async fn cancelled_order_cannot_be_reopened_by_admin() -> anyhow::Result<()> {
    let Some(fx) = fixture().await? else {
        return Ok(());
    };
    let product_id = create_product(&fx.state, 100_000, 10).await?;
    let order_id = order_service::place_order(
        &fx.state,
        &fx.customer,
        checkout(&fx, product_id, 2, fx.gateway_method, None),
    )
    .await?
    .data
    .expect("placed order")
    .order
    .order
    .id;

    let err = move_order(&fx, &fx.admin, order_id, "completed")
        .await
        .err()
        .expect("unpaid order cannot complete");
    assert!(matches!(err, AppError::BadRequest(_)));

    fx.gateway.query_code.store(-54, Ordering::SeqCst);
    payment_service::reconcile(&fx.state, &fx.customer, order_id).await?;
    assert_eq!(stock_of(&fx.state, product_id).await?, 10);

    for target in ["processing", "shipping", "completed", "cancelled"] {
        let err = move_order(&fx, &fx.admin, order_id, target)
            .await
            .err()
            .expect("cancelled is final");
        assert!(matches!(err, AppError::BadRequest(_)));
    }
    assert_eq!(
        order_status(&fx.state, order_id).await?,
        ("cancelled".to_string(), "failed".to_string())
    );
    assert_eq!(stock_of(&fx.state, product_id).await?, 10);
    Ok(())
}

#[tokio::test]
async fn admin_cancel_restocks_and_releases_discount() -> anyhow::Result<()> {
    let Some(fx) = fixture().await? else {
        return Ok(());
    };
    let product_id = create_product(&fx.state, 100_000, 10).await?;
    let (discount_id, code) = create_discount(&fx.state, 10, 0, 5).await?;
    let order_id = order_service::place_order(
        &fx.state,
        &fx.customer,
        checkout(&fx, product_id, 3, fx.cod_method, Some(&code)),
    )
    .await?
    .data
    .expect("placed order")
    .order
    .order
    .id;
    assert_eq!(stock_of(&fx.state, product_id).await?, 7);
    assert_eq!(used_count(&fx.state, discount_id).await?, 1);

    let updated = move_order(&fx, &fx.admin, order_id, "cancelled").await?;
    assert_eq!(updated, "cancelled");
    assert_eq!(
        order_status(&fx.state, order_id).await?,
        ("cancelled".to_string(), "canceled".to_string())
    );
    assert_eq!(stock_of(&fx.state, product_id).await?, 10);
    assert_eq!(used_count(&fx.state, discount_id).await?, 0);

    let err = move_order(&fx, &fx.admin, order_id, "cancelled")
        .await
        .err()
        .expect("already cancelled");
    assert!(matches!(err, AppError::BadRequest(_)));
    assert_eq!(stock_of(&fx.state, product_id).await?, 10);
    Ok(())
}

#[tokio::test]
async fn cod_order_is_fulfilled_and_collected() -> anyhow::Result<()> {
    let Some(fx) = fixture().await? else {
        return Ok(());
    };
    let product_id = create_product(&fx.state, 70_000, 4).await?;
    let order_id = order_service::place_order(
        &fx.state,
        &fx.customer,
        checkout(&fx, product_id, 1, fx.cod_method, None),
    )
    .await?
    .data
    .expect("placed order")
    .order
    .order
    .id;

    let err = move_order(&fx, &fx.customer, order_id, "shipping")
        .await
        .err()
        .expect("customers cannot update status");
    assert!(matches!(err, AppError::Forbidden));

    let err = move_order(&fx, &fx.admin, order_id, "refunded")
        .await
        .err()
        .expect("refunds go through refund requests");
    assert!(matches!(err, AppError::BadRequest(_)));

    move_order(&fx, &fx.admin, order_id, "shipping").await?;
    assert_eq!(
        order_status(&fx.state, order_id).await?,
        ("shipping".to_string(), "pending".to_string())
    );

    move_order(&fx, &fx.admin, order_id, "completed").await?;
    assert_eq!(
        order_status(&fx.state, order_id).await?,
        ("completed".to_string(), "paid".to_string())
    );

    let err = move_order(&fx, &fx.admin, order_id, "cancelled")
        .await
        .err()
        .expect("paid orders are refunded, not cancelled");
    assert!(matches!(err, AppError::BadRequest(_)));
    assert_eq!(stock_of(&fx.state, product_id).await?, 3);
    Ok(())
}

#[tokio::test]
async fn processing_and_unreachable_gateway_change_nothing() -> anyhow::Result<()> {
    let Some(fx) = fixture().await? else {
        return Ok(());
    };
    let product_id = create_product(&fx.state, 40_000, 5).await?;
    let placed = order_service::place_order(
        &fx.state,
        &fx.customer,
        checkout(&fx, product_id, 1, fx.gateway_method, None),
    )
    .await?
    .data
    .expect("placed order");
    let order_id = placed.order.order.id;

    fx.gateway.query_code.store(2, Ordering::SeqCst);
    let status = payment_service::reconcile(&fx.state, &fx.customer, order_id)
        .await?
        .data
        .expect("status");
    assert_eq!(status.order_status, "pending");
    assert_eq!(status.payment_status, "pending");

    fx.gateway.unreachable.store(true, Ordering::SeqCst);
    let err = payment_service::reconcile(&fx.state, &fx.customer, order_id)
        .await
        .err()
        .expect("gateway down");
    assert!(matches!(err, AppError::GatewayCommunication(_)));

    let order = Orders::find_by_id(order_id)
        .one(&fx.state.orm)
        .await?
        .expect("order");
    assert_eq!(order.status, "pending");
    assert_eq!(stock_of(&fx.state, product_id).await?, 4);

    let stranger = create_user(&fx.state, "user").await?;
    let err = payment_service::reconcile(&fx.state, &stranger, order_id)
        .await
        .err()
        .expect("not the owner");
    assert!(matches!(err, AppError::NotFound));
    Ok(())
}

#[tokio::test]
async fn callback_settles_payment_once() -> anyhow::Result<()> {
    let Some(fx) = fixture().await? else {
        return Ok(());
    };
    let product_id = create_product(&fx.state, 60_000, 5).await?;
    let placed = order_service::place_order(
        &fx.state,
        &fx.customer,
        checkout(&fx, product_id, 1, fx.gateway_method, None),
    )
    .await?
    .data
    .expect("placed order");
    let transaction_id = placed
        .order
        .payment
        .and_then(|p| p.transaction_id)
        .expect("transaction id");

    let data = json!({ "app_trans_id": transaction_id, "zp_trans_id": 240_001, "amount": 60_000 })
        .to_string();

    let forged = payment_service::handle_gateway_callback(
        &fx.state,
        GatewayCallback {
            data: data.clone(),
            mac: "forged".into(),
            kind: Some(1),
        },
    )
    .await;
    assert_eq!(forged.return_code, -1);

    let ack = payment_service::handle_gateway_callback(
        &fx.state,
        GatewayCallback {
            data: data.clone(),
            mac: "valid-mac".into(),
            kind: Some(1),
        },
    )
    .await;
    assert_eq!(ack.return_code, 1);

    let again = payment_service::handle_gateway_callback(
        &fx.state,
        GatewayCallback {
            data,
            mac: "valid-mac".into(),
            kind: Some(1),
        },
    )
    .await;
    assert_eq!(again.return_code, 2);

    let payment = OrderPayments::find()
        .filter(PaymentCol::OrderId.eq(placed.order.order.id))
        .one(&fx.state.orm)
        .await?
        .expect("payment");
    assert_eq!(payment.status, "paid");
    assert_eq!(payment.gateway_reference.as_deref(), Some("240001"));
    assert!(payment.paid_at.is_some());
    Ok(())
}

#[tokio::test]
async fn refund_requests_follow_order_rules() -> anyhow::Result<()> {
    let Some(fx) = fixture().await? else {
        return Ok(());
    };
    let product_id = create_product(&fx.state, 100_000, 10).await?;
    let placed = order_service::place_order(
        &fx.state,
        &fx.customer,
        checkout(&fx, product_id, 1, fx.cod_method, None),
    )
    .await?
    .data
    .expect("placed order");
    let order_id = placed.order.order.id;

    let request = |amount: i64| CreateRefundRequest {
        order_id,
        reason: "Wrong size".into(),
        amount,
        images: Some(vec!["https://img.test/1.jpg".into()]),
        description: None,
    };

    let err = refund_service::create_refund_request(&fx.state, &fx.customer, request(150_000))
        .await
        .err()
        .expect("amount above total");
    assert!(matches!(
        err,
        AppError::RefundAmountExceeded {
            requested: 150_000,
            limit: 100_000
        }
    ));

    let created = refund_service::create_refund_request(&fx.state, &fx.customer, request(100_000))
        .await?
        .data
        .expect("refund request");
    assert_eq!(created.status, "pending");

    let err = refund_service::create_refund_request(&fx.state, &fx.customer, request(50_000))
        .await
        .err()
        .expect("duplicate");
    assert!(matches!(err, AppError::DuplicateRefundRequest));

    let err = refund_service::approve_refund_request(&fx.state, &fx.customer, created.id)
        .await
        .err()
        .expect("customers cannot approve");
    assert!(matches!(err, AppError::Forbidden));

    let decision = refund_service::approve_refund_request(&fx.state, &fx.admin, created.id)
        .await?
        .data
        .expect("decision");
    assert_eq!(decision.status, "approved");
    assert_eq!(fx.gateway.refunds.load(Ordering::SeqCst), 0);

    let order = Orders::find_by_id(order_id)
        .one(&fx.state.orm)
        .await?
        .expect("order");
    assert_eq!(order.status, "refunded");

    let payment = OrderPayments::find()
        .filter(PaymentCol::OrderId.eq(order_id))
        .one(&fx.state.orm)
        .await?
        .expect("payment");
    assert_eq!(payment.status, "pending");
    Ok(())
}

#[tokio::test]
async fn rejected_request_allows_a_new_one() -> anyhow::Result<()> {
    let Some(fx) = fixture().await? else {
        return Ok(());
    };
    let product_id = create_product(&fx.state, 80_000, 10).await?;
    let order_id = order_service::place_order(
        &fx.state,
        &fx.customer,
        checkout(&fx, product_id, 1, fx.cod_method, None),
    )
    .await?
    .data
    .expect("placed order")
    .order
    .order
    .id;

    let first = refund_service::create_refund_request(
        &fx.state,
        &fx.customer,
        CreateRefundRequest {
            order_id,
            reason: "Changed my mind".into(),
            amount: 80_000,
            images: None,
            description: None,
        },
    )
    .await?
    .data
    .expect("refund request");

    let decision = refund_service::reject_refund_request(
        &fx.state,
        &fx.admin,
        first.id,
        RejectRefundRequest {
            note: Some("Outside the return window".into()),
        },
    )
    .await?
    .data
    .expect("decision");
    assert_eq!(decision.status, "rejected");
    assert_eq!(
        decision.refund_request.admin_note.as_deref(),
        Some("Outside the return window")
    );

    let second = refund_service::create_refund_request(
        &fx.state,
        &fx.customer,
        CreateRefundRequest {
            order_id,
            reason: "Item arrived damaged".into(),
            amount: 40_000,
            images: None,
            description: Some("Torn seam".into()),
        },
    )
    .await?;
    assert!(second.data.is_some());
    Ok(())
}

#[tokio::test]
async fn gateway_refusing_refund_keeps_order_paid() -> anyhow::Result<()> {
    let Some(fx) = fixture().await? else {
        return Ok(());
    };
    let product_id = create_product(&fx.state, 120_000, 10).await?;
    let order_id = order_service::place_order(
        &fx.state,
        &fx.customer,
        checkout(&fx, product_id, 1, fx.gateway_method, None),
    )
    .await?
    .data
    .expect("placed order")
    .order
    .order
    .id;

    let status = payment_service::reconcile(&fx.state, &fx.customer, order_id)
        .await?
        .data
        .expect("status");
    assert_eq!(status.order_status, "completed");
    assert_eq!(status.payment_status, "paid");

    let request = refund_service::create_refund_request(
        &fx.state,
        &fx.customer,
        CreateRefundRequest {
            order_id,
            reason: "Not as described".into(),
            amount: 120_000,
            images: None,
            description: None,
        },
    )
    .await?
    .data
    .expect("refund request");

    fx.gateway.refund_code.store(2, Ordering::SeqCst);
    let err = refund_service::approve_refund_request(&fx.state, &fx.admin, request.id)
        .await
        .err()
        .expect("gateway refused");
    assert!(matches!(err, AppError::RefundFailed(2)));

    let order = Orders::find_by_id(order_id)
        .one(&fx.state.orm)
        .await?
        .expect("order");
    assert_eq!(order.status, "completed");
    let stored = RefundRequests::find_by_id(request.id)
        .one(&fx.state.orm)
        .await?
        .expect("refund request");
    assert_eq!(stored.status, "pending");

    fx.gateway.refund_code.store(3, Ordering::SeqCst);
    let decision = refund_service::approve_refund_request(&fx.state, &fx.admin, request.id)
        .await?
        .data
        .expect("decision");
    assert_eq!(decision.status, "approved");
    let payment = OrderPayments::find()
        .filter(PaymentCol::OrderId.eq(order_id))
        .one(&fx.state.orm)
        .await?
        .expect("payment");
    assert_eq!(payment.status, "refunded");
    assert_eq!(fx.gateway.refunds.load(Ordering::SeqCst), 2);
    Ok(())
}

#[tokio::test]
async fn reject_waits_for_approval_in_flight() -> anyhow::Result<()> {
    let Some(fx) = fixture().await? else {
        return Ok(());
    };
    let (order_id, request_id) = paid_order_with_refund_request(&fx, 150_000).await?;

    fx.gateway.refund_delay_ms.store(800, Ordering::SeqCst);
    let approval = {
        let state = fx.state.clone();
        let admin = fx.admin.clone();
        tokio::spawn(async move {
            refund_service::approve_refund_request(&state, &admin, request_id).await
        })
    };
    tokio::time::sleep(std::time::Duration::from_millis(200)).await;

    let rejected = refund_service::reject_refund_request(
        &fx.state,
        &fx.admin,
        request_id,
        RejectRefundRequest { note: None },
    )
    .await;
    let approved = approval.await?;

    assert!(approved.is_ok());
    assert!(matches!(rejected, Err(AppError::BadRequest(_))));
    assert_eq!(fx.gateway.refunds.load(Ordering::SeqCst), 1);

    let stored = RefundRequests::find_by_id(request_id)
        .one(&fx.state.orm)
        .await?
        .expect("refund request");
    assert_eq!(stored.status, "approved");
    assert_eq!(
        order_status(&fx.state, order_id).await?,
        ("refunded".to_string(), "refunded".to_string())
    );

    let err = refund_service::create_refund_request(
        &fx.state,
        &fx.customer,
        CreateRefundRequest {
            order_id,
            reason: "Second attempt".into(),
            amount: 150_000,
            images: None,
            description: None,
        },
    )
    .await
    .err()
    .expect("order already has an approved request");
    assert!(matches!(err, AppError::DuplicateRefundRequest));
    Ok(())
}

#[tokio::test]
async fn retried_approval_resends_the_same_refund_reference() -> anyhow::Result<()> {
    let Some(fx) = fixture().await? else {
        return Ok(());
    };
    let (order_id, request_id) = paid_order_with_refund_request(&fx, 110_000).await?;

    fx.gateway.unreachable.store(true, Ordering::SeqCst);
    let err = refund_service::approve_refund_request(&fx.state, &fx.admin, request_id)
        .await
        .err()
        .expect("gateway down");
    assert!(matches!(err, AppError::GatewayCommunication(_)));

    let stored = RefundRequests::find_by_id(request_id)
        .one(&fx.state.orm)
        .await?
        .expect("refund request");
    assert_eq!(stored.status, "pending");
    let reserved = stored.refund_reference.expect("reference kept for the retry");

    fx.gateway.unreachable.store(false, Ordering::SeqCst);
    refund_service::approve_refund_request(&fx.state, &fx.admin, request_id).await?;

    let sent = fx.gateway.refund_references.lock().unwrap().clone();
    assert_eq!(sent, vec![reserved.clone(), reserved]);
    assert_eq!(
        order_status(&fx.state, order_id).await?,
        ("refunded".to_string(), "refunded".to_string())
    );
    Ok(())
}

#[tokio::test]
async fn refused_refund_gets_a_new_reference_next_time() -> anyhow::Result<()> {
    let Some(fx) = fixture().await? else {
        return Ok(());
    };
    let (_, request_id) = paid_order_with_refund_request(&fx, 95_000).await?;

    fx.gateway.refund_code.store(2, Ordering::SeqCst);
    let err = refund_service::approve_refund_request(&fx.state, &fx.admin, request_id)
        .await
        .err()
        .expect("gateway refused");
    assert!(matches!(err, AppError::RefundFailed(2)));
    let stored = RefundRequests::find_by_id(request_id)
        .one(&fx.state.orm)
        .await?
        .expect("refund request");
    assert_eq!(stored.refund_reference, None);

    fx.gateway.refund_code.store(1, Ordering::SeqCst);
    refund_service::approve_refund_request(&fx.state, &fx.admin, request_id).await?;

    let sent = fx.gateway.refund_references.lock().unwrap().clone();
    assert_eq!(sent.len(), 2);
    assert_ne!(sent[0], sent[1]);
    Ok(())
}
