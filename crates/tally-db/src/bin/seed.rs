//! # Seed Data Generator
//!
//! Populates a SQLite database with products and clients for development.
//!
//! ## Usage
//! ```bash
//! # 200 products, 25 clients (default)
//! cargo run -p tally-db --bin seed
//!
//! # Custom amounts
//! cargo run -p tally-db --bin seed -- --count 1000 --clients 100
//!
//! # Specify database path
//! cargo run -p tally-db --bin seed -- --db ./data/tally.db
//! ```
//!
//! ## Generated Data
//! - Products: `{Item} {Size}` with SKU `{CAT}-{ITEM}-{NNN}`,
//!   price $0.50 - $8.49, stock 0 - 60 (so some start out of stock)
//! - Clients: `{First} {Last}` with a local phone number and, for every
//!   third client, an email address

use std::env;

use chrono::Utc;
use tally_core::{Client, ClientId, Money, NewClient, NewProduct, Product, ProductId};
use tally_db::{Database, DbConfig};

/// Product categories for realistic test data
const CATEGORIES: &[(&str, &[&str])] = &[
    (
        "GRO",
        &[
            "Rice", "Flour", "Sugar", "Salt", "Lentils", "Chickpeas", "Pasta", "Oats",
            "Tea", "Coffee",
        ],
    ),
    (
        "DRY",
        &[
            "Milk", "Yogurt", "Butter", "Cheese", "Eggs", "Cream",
        ],
    ),
    (
        "BEV",
        &[
            "Cola", "Orange Soda", "Mineral Water", "Mango Juice", "Lemonade",
        ],
    ),
    (
        "HOM",
        &[
            "Dish Soap", "Laundry Powder", "Matches", "Candles", "Batteries", "Light Bulb",
        ],
    ),
];

/// Size variants with a price add-on in cents
const SIZES: &[(&str, i64)] = &[
    ("Small", 0),
    ("Medium", 75),
    ("Large", 150),
    ("Family", 300),
];

const FIRST_NAMES: &[&str] = &[
    "Ana", "Bilal", "Carmen", "Dawit", "Elena", "Farah", "Goran", "Hana", "Ivan", "Jamal",
];

const LAST_NAMES: &[&str] = &[
    "Alvarez", "Bakr", "Costa", "Dimitrov", "Eze", "Fischer", "Gupta", "Haddad",
];

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args: Vec<String> = env::args().collect();

    let mut count: usize = 200;
    let mut client_count: usize = 25;
    let mut db_path = String::from("./tally_dev.db");

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--count" | "-c" => {
                if i + 1 < args.len() {
                    count = args[i + 1].parse().unwrap_or(200);
                    i += 1;
                }
            }
            "--clients" => {
                if i + 1 < args.len() {
                    client_count = args[i + 1].parse().unwrap_or(25);
                    i += 1;
                }
            }
            "--db" | "-d" => {
                if i + 1 < args.len() {
                    db_path = args[i + 1].clone();
                    i += 1;
                }
            }
            "--help" | "-h" => {
                println!("Tally POS Seed Data Generator");
                println!();
                println!("Usage: seed [OPTIONS]");
                println!();
                println!("Options:");
                println!("  -c, --count <N>      Number of products to generate (default: 200)");
                println!("      --clients <N>    Number of clients to generate (default: 25)");
                println!("  -d, --db <PATH>      Database file path (default: ./tally_dev.db)");
                println!("  -h, --help           Show this help message");
                return Ok(());
            }
            _ => {}
        }
        i += 1;
    }

    println!("🌱 Tally POS Seed Data Generator");
    println!("================================");
    println!("Database: {}", db_path);
    println!("Products: {}", count);
    println!("Clients:  {}", client_count);
    println!();

    let db = Database::new(DbConfig::new(&db_path)).await?;

    println!("✓ Connected to database");
    println!("✓ Migrations applied");

    let existing = db.products().count().await? + db.clients().count().await?;
    if existing > 0 {
        println!("⚠ Database already has {} products/clients", existing);
        println!("  Skipping seed to avoid duplicates.");
        println!("  Delete the database file to regenerate.");
        return Ok(());
    }

    println!();
    println!("Generating products...");

    let start = std::time::Instant::now();
    let mut generated = 0;

    'outer: for (category_code, items) in CATEGORIES {
        for (item_idx, item) in items.iter().enumerate() {
            for (size_name, price_addon) in SIZES {
                if generated >= count {
                    break 'outer;
                }

                let product = generate_product(
                    category_code,
                    item,
                    size_name,
                    *price_addon,
                    item_idx,
                    generated,
                )?;
                if let Err(e) = db.products().insert(&product).await {
                    eprintln!("Failed to insert {}: {}", product.sku(), e);
                    continue;
                }

                generated += 1;
                if generated % 100 == 0 {
                    println!("  Generated {} products...", generated);
                }
            }
        }
    }

    println!("✓ Generated {} products", generated);

    println!();
    println!("Generating clients...");

    let mut clients = 0;
    for seed in 0..client_count {
        let client = generate_client(seed)?;
        if let Err(e) = db.clients().insert(&client).await {
            eprintln!("Failed to insert {}: {}", client.name(), e);
            continue;
        }
        clients += 1;
    }

    let elapsed = start.elapsed();
    println!("✓ Generated {} clients", clients);
    println!();
    println!("✓ Seed complete in {:?}", elapsed);

    db.close().await;
    Ok(())
}

/// Generates a single product. Deterministic in `seed`.
fn generate_product(
    category: &str,
    item: &str,
    size: &str,
    price_addon: i64,
    item_idx: usize,
    seed: usize,
) -> Result<Product, Box<dyn std::error::Error>> {
    let code: String = item
        .chars()
        .filter(|c| c.is_ascii_alphabetic())
        .take(3)
        .collect::<String>()
        .to_uppercase();
    let sku = format!("{}-{}-{:03}", category, code, item_idx * 10 + seed % 10);

    let price_cents = 50 + ((seed * 37) % 500) as i64 + price_addon;
    let stock = (seed * 13 % 61) as i64;

    Ok(Product::new(
        ProductId::new(),
        NewProduct {
            name: format!("{} {}", item, size),
            sku,
            price: Money::from_cents(price_cents),
            stock,
        },
    )?)
}

/// Generates a single client. Deterministic in `seed`.
fn generate_client(seed: usize) -> Result<Client, Box<dyn std::error::Error>> {
    let first = FIRST_NAMES[seed % FIRST_NAMES.len()];
    let last = LAST_NAMES[(seed / FIRST_NAMES.len()) % LAST_NAMES.len()];
    let email = (seed % 3 == 0)
        .then(|| format!("{}.{}@example.com", first.to_lowercase(), last.to_lowercase()));

    Ok(Client::new(
        ClientId::new(),
        NewClient {
            name: format!("{} {}", first, last),
            phone: format!("555-{:04}", 1000 + seed),
            email,
        },
        Utc::now(),
    )?)
}
