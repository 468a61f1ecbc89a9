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
        cart::{AddItemRequest, CartItemView, CartView},
        orders::{CheckoutRequest, OrderList, OrderWithLines, UpdateOrderStatusRequest},
    },
    models::{Cart, CartLine, Order, OrderLine, OrderStatus, Product},
    response::{ApiResponse, Meta},
    routes::{cart, health, orders, params, products},
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
        products::list_products,
        products::get_product,
        cart::get_cart,
        cart::add_item,
        cart::remove_item,
        cart::clear_cart,
        orders::checkout,
        orders::list_my_orders,
        orders::get_my_order,
        orders::cancel_order,
        orders::list_all_orders,
        orders::get_order,
        orders::update_order_status
    ),
    components(
        schemas(
            Product,
            Cart,
            CartLine,
            Order,
            OrderLine,
            OrderStatus,
            AddItemRequest,
            CartItemView,
            CartView,
            CheckoutRequest,
            UpdateOrderStatusRequest,
            OrderList,
            OrderWithLines,
            products::ProductList,
            params::Pagination,
            params::OrderListQuery,
            params::EmployeeOrderQuery,
            Meta,
            ApiResponse<Product>,
            ApiResponse<products::ProductList>,
            ApiResponse<CartView>,
            ApiResponse<CartLine>,
            ApiResponse<Order>,
            ApiResponse<OrderList>,
            ApiResponse<OrderWithLines>
        )
    ),
    security(
        ("bearer_auth" = [])
    ),
    modifiers(&SecurityAddon),
    tags(
        (name = "Health", description = "Health check endpoint"),
        (name = "Products", description = "Read-only catalog endpoints"),
        (name = "Cart", description = "Cart endpoints"),
        (name = "Orders", description = "Order lifecycle endpoints"),
    )
)]
pub struct ApiDoc;

pub fn scalar_docs() -> Scalar<OpenApiSpec> {
    Scalar::with_url("/docs", ApiDoc::openapi())
}
