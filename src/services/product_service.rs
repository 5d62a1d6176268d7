use std::collections::HashMap;

use sea_orm::sea_query::Expr;
use sea_orm::sea_query::extension::postgres::PgExpr;
use sea_orm::{
    ColumnTrait, Condition, ConnectionTrait, EntityTrait, PaginatorTrait, QueryFilter,
    QueryOrder, QuerySelect,
};
use uuid::Uuid;

use crate::{
    dto::products::{ProductDetail, ProductList},
    entity::{
        colors::{Column as ColorCol, Entity as Colors},
        product_variants::{Column as VariantCol, Entity as ProductVariants, Model as VariantModel},
        products::{Column, Entity as Products},
        sizes::{Column as SizeCol, Entity as Sizes},
    },
    error::{AppError, AppResult},
    models::{Attribute, Product, ProductVariant},
    response::{ApiResponse, Meta},
    routes::params::{ProductQuery, ProductSortBy, SortOrder},
    state::AppState,
};

pub const STATUS_PUBLIC: &str = "public";

pub async fn list_products(
    state: &AppState,
    query: ProductQuery,
) -> AppResult<ApiResponse<ProductList>> {
    let (page, limit, offset) = query.pagination.normalize();
    let mut condition = Condition::all()
        .add(Column::Status.eq(STATUS_PUBLIC))
        .add(Column::DeletedAt.is_null());

    if let Some(search) = query.q.as_ref().filter(|s| !s.is_empty()) {
        let pattern = format!("%{}%", search);
        condition = condition.add(
            Condition::any()
                .add(Expr::col(Column::Name).ilike(pattern.clone()))
                .add(Expr::col(Column::Description).ilike(pattern)),
        );
    }

    if let Some(min_price) = query.min_price {
        condition = condition.add(Column::Price.gte(min_price));
    }

    if let Some(max_price) = query.max_price {
        condition = condition.add(Column::Price.lte(max_price));
    }

    let sort_by = query.sort_by.unwrap_or(ProductSortBy::CreatedAt);
    let sort_order = query.sort_order.unwrap_or(SortOrder::Desc);
    let sort_col = match sort_by {
        ProductSortBy::CreatedAt => Column::CreatedAt,
        ProductSortBy::Price => Column::Price,
        ProductSortBy::Name => Column::Name,
    };

    let mut finder = Products::find().filter(condition);
    finder = match sort_order {
        SortOrder::Asc => finder.order_by_asc(sort_col),
        SortOrder::Desc => finder.order_by_desc(sort_col),
    };

    let total = finder.clone().count(&state.orm).await? as i64;

    let items = finder
        .limit(limit as u64)
        .offset(offset as u64)
        .all(&state.orm)
        .await?
        .into_iter()
        .map(Product::from)
        .collect();

    let meta = Meta::new(page, limit, total);
    let data = ProductList { items };
    Ok(ApiResponse::success("Products", data, Some(meta)))
}

pub async fn get_product(state: &AppState, id: Uuid) -> AppResult<ApiResponse<ProductDetail>> {
    let product = Products::find_by_id(id)
        .filter(Column::DeletedAt.is_null())
        .one(&state.orm)
        .await?
        .ok_or(AppError::NotFound)?;

    let variants = ProductVariants::find()
        .filter(VariantCol::ProductId.eq(product.id))
        .order_by_asc(VariantCol::CreatedAt)
        .all(&state.orm)
        .await?;
    let variants = describe_variants(&state.orm, variants).await?;

    Ok(ApiResponse::success(
        "Product",
        ProductDetail {
            product: Product::from(product),
            variants,
        },
        None,
    ))
}

/// Attaches size and color labels to variant rows, preserving order.
pub async fn describe_variants<C: ConnectionTrait>(
    conn: &C,
    variants: Vec<VariantModel>,
) -> AppResult<Vec<ProductVariant>> {
    let size_ids: Vec<Uuid> = variants.iter().filter_map(|v| v.size_id).collect();
    let color_ids: Vec<Uuid> = variants.iter().filter_map(|v| v.color_id).collect();

    let sizes: HashMap<Uuid, Attribute> = if size_ids.is_empty() {
        HashMap::new()
    } else {
        Sizes::find()
            .filter(SizeCol::Id.is_in(size_ids))
            .all(conn)
            .await?
            .into_iter()
            .map(|s| (s.id, Attribute::from(s)))
            .collect()
    };
    let colors: HashMap<Uuid, Attribute> = if color_ids.is_empty() {
        HashMap::new()
    } else {
        Colors::find()
            .filter(ColorCol::Id.is_in(color_ids))
            .all(conn)
            .await?
            .into_iter()
            .map(|c| (c.id, Attribute::from(c)))
            .collect()
    };

    Ok(variants
        .into_iter()
        .map(|v| ProductVariant {
            id: v.id,
            product_id: v.product_id,
            size: v.size_id.and_then(|id| sizes.get(&id).cloned()),
            color: v.color_id.and_then(|id| colors.get(&id).cloned()),
            quantity: v.quantity,
        })
        .collect())
}
