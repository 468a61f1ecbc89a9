use construction_store_api::{config::AppConfig, db::create_pool};
use uuid::Uuid;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let config = AppConfig::from_env()?;

    let pool = create_pool(&config.database_url).await?;
    // Ensure migrations are applied.
    sqlx::migrate!("./migrations").run(&pool).await?;

    seed_products(&pool).await?;

    println!("Seed completed");
    Ok(())
}

async fn seed_products(pool: &sqlx::PgPool) -> anyhow::Result<()> {
    // Prices in minor currency units.
    let products = vec![
        (
            "Portland cement M500, 50 kg",
            "General-purpose cement for foundations and screeds",
            45_000,
            120,
        ),
        (
            "Red facing brick, pallet of 300",
            "Solid ceramic brick, frost-resistant",
            1_240_000,
            18,
        ),
        (
            "Drywall sheet 2500x1200x12.5 mm",
            "Standard gypsum board for interior walls",
            32_500,
            200,
        ),
        (
            "Quarry sand, 1 t bag",
            "Washed sand for mortar and concrete",
            95_000,
            40,
        ),
        (
            "Acrylic wall paint, white, 10 l",
            "Matte interior paint",
            210_000,
            55,
        ),
    ];

    for (name, description, price, quantity) in products {
        sqlx::query(
            r#"
            INSERT INTO products (id, name, description, price, available_quantity)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (name) DO NOTHING
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(name)
        .bind(description)
        .bind(price as i64)
        .bind(quantity)
        .execute(pool)
        .await?;
    }

    println!("Seeded products");
    Ok(())
}
