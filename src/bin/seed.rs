use chrono::{Duration, Utc};
use storefront_api::{
    db::{create_orm_conn, create_pool, run_migrations},
    services::auth_service::hash_password,
};
use uuid::Uuid;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let database_url = std::env::var("DATABASE_URL")?;

    let pool = create_pool(&database_url).await?;
    // Ensure migrations are applied.
    let orm = create_orm_conn(&database_url).await?;
    run_migrations(&orm).await?;

    let admin_id = ensure_user_with_role(&pool, "admin@example.com", "admin123", "Admin", "admin").await?;
    let user_id = ensure_user_with_role(&pool, "user@example.com", "user123", "Demo User", "user").await?;
    seed_payment_methods(&pool).await?;
    seed_catalog(&pool).await?;
    seed_discounts(&pool).await?;

    println!("Seed completed. Admin ID: {admin_id}, User ID: {user_id}");
    Ok(())
}

async fn ensure_user_with_role(
    pool: &sqlx::PgPool,
    email: &str,
    password: &str,
    name: &str,
    role: &str,
) -> anyhow::Result<Uuid> {
    let password_hash = hash_password(password)?;

    let (user_id,): (Uuid,) = sqlx::query_as(
        r#"
        INSERT INTO users (id, email, password_hash, name, role)
        VALUES ($1, $2, $3, $4, $5)
        ON CONFLICT (email) DO UPDATE SET role = EXCLUDED.role
        RETURNING id
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(email)
    .bind(password_hash)
    .bind(name)
    .bind(role)
    .fetch_one(pool)
    .await?;

    println!("Ensured user {email} (role={role})");
    Ok(user_id)
}

async fn seed_payment_methods(pool: &sqlx::PgPool) -> anyhow::Result<()> {
    for (name, kind) in [("Cash on delivery", "cod"), ("ZaloPay", "gateway")] {
        sqlx::query(
            "INSERT INTO payment_methods (id, name, kind) VALUES ($1, $2, $3) ON CONFLICT (name) DO NOTHING",
        )
        .bind(Uuid::new_v4())
        .bind(name)
        .bind(kind)
        .execute(pool)
        .await?;
    }
    println!("Seeded payment methods");
    Ok(())
}

async fn upsert_named(pool: &sqlx::PgPool, table: &str, name: &str) -> anyhow::Result<Uuid> {
    let sql = format!(
        "INSERT INTO {table} (id, name) VALUES ($1, $2) \
         ON CONFLICT (name) DO UPDATE SET name = EXCLUDED.name RETURNING id"
    );
    let (id,): (Uuid,) = sqlx::query_as(&sql)
        .bind(Uuid::new_v4())
        .bind(name)
        .fetch_one(pool)
        .await?;
    Ok(id)
}

async fn seed_catalog(pool: &sqlx::PgPool) -> anyhow::Result<()> {
    let mut sizes = Vec::new();
    for size in ["S", "M", "L"] {
        sizes.push(upsert_named(pool, "sizes", size).await?);
    }
    let mut colors = Vec::new();
    for color in ["Black", "White"] {
        colors.push(upsert_named(pool, "colors", color).await?);
    }

    // (name, description, price, promotional price, stock, has variants)
    let products = vec![
        ("Basic Tee", "Everyday cotton t-shirt", 100000_i64, None, 0, true),
        ("Linen Shirt", "Breathable summer shirt", 350000, Some(299000_i64), 0, true),
        ("Canvas Tote", "Sturdy shopping bag", 120000, None, 80, false),
        ("Gift Card", "Store credit", 500000, None, 1000, false),
    ];

    for (name, desc, price, promo, stock, has_variants) in products {
        let inserted: Option<(Uuid,)> = sqlx::query_as(
            r#"
            INSERT INTO products (id, name, description, price, promotional_price, stock_quantity)
            VALUES ($1, $2, $3, $4, $5, $6)
            ON CONFLICT (name) DO NOTHING
            RETURNING id
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(name)
        .bind(desc)
        .bind(price)
        .bind(promo)
        .bind(stock)
        .fetch_optional(pool)
        .await?;

        let Some((product_id,)) = inserted else {
            continue;
        };
        if !has_variants {
            continue;
        }
        for size_id in &sizes {
            for color_id in &colors {
                sqlx::query(
                    "INSERT INTO product_variants (id, product_id, size_id, color_id, quantity) VALUES ($1, $2, $3, $4, $5)",
                )
                .bind(Uuid::new_v4())
                .bind(product_id)
                .bind(size_id)
                .bind(color_id)
                .bind(25)
                .execute(pool)
                .await?;
            }
        }
    }

    println!("Seeded products");
    Ok(())
}

async fn seed_discounts(pool: &sqlx::PgPool) -> anyhow::Result<()> {
    let now = Utc::now();
    sqlx::query(
        r#"
        INSERT INTO discounts (id, code, percent, valid_from, valid_to, min_order_amount, usage_limit)
        VALUES ($1, 'SUMMER10', 10, $2, $3, 100000, 100)
        ON CONFLICT (code) DO NOTHING
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(now - Duration::days(1))
    .bind(now + Duration::days(90))
    .execute(pool)
    .await?;

    println!("Seeded discounts");
    Ok(())
}
