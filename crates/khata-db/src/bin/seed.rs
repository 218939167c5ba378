//! # Seed Data Generator
//!
//! Populates the database with demo customers, inventory, invoices and
//! payments for development.
//!
//! ## Usage
//! ```bash
//! # 25 customers (default)
//! cargo run -p khata-db --bin seed
//!
//! # Custom amount
//! cargo run -p khata-db --bin seed -- --customers 100
//!
//! # Specify database path
//! cargo run -p khata-db --bin seed -- --db ./data/khata.db
//! ```
//!
//! ## Generated Data
//! - Products from a few distributors, each with an opening batch and,
//!   for every other product, a second restock batch
//! - Customers with two to four invoices spread over the last quarter
//! - A payment for most customers, allocated oldest invoice first

use chrono::{Duration, Utc};
use khata_core::{PaymentMode, PaymentStatus, Product};
use khata_db::{Database, DbConfig, NewBatch, NewCustomer, NewPayment, NewProduct, NewSale, NewSaleItem};
use std::env;

/// Products per distributor, with price in paise and GST in bps.
const CATALOGUE: &[(&str, &[(&str, i64, u32)])] = &[
    (
        "India Gate",
        &[
            ("Basmati Rice 5kg", 45_000, 500),
            ("Basmati Rice 1kg", 9_800, 500),
            ("Sona Masoori 10kg", 62_000, 500),
        ],
    ),
    (
        "Tata",
        &[
            ("Tata Salt 1kg", 2_800, 0),
            ("Tata Tea Gold 500g", 31_000, 500),
            ("Tata Sampann Toor Dal 1kg", 16_500, 500),
        ],
    ),
    (
        "Amul",
        &[
            ("Amul Butter 500g", 28_500, 1_200),
            ("Amul Ghee 1L", 65_000, 1_200),
            ("Amul Cheese Slices 200g", 14_500, 1_200),
        ],
    ),
    (
        "Parle",
        &[
            ("Parle-G 800g", 9_000, 1_800),
            ("Monaco 200g", 3_500, 1_800),
            ("Hide & Seek 120g", 4_000, 1_800),
        ],
    ),
];

const FIRST_NAMES: &[&str] = &[
    "Asha", "Ravi", "Meera", "Imran", "Sunita", "Kiran", "Farah", "Vikram", "Neha", "Arjun",
];

const SHOP_KINDS: &[&str] = &["Traders", "Kirana", "Stores", "General Store", "Mart"];

const CITIES: &[&str] = &["Pune", "Nashik", "Indore", "Nagpur", "Surat"];

const MODES: &[PaymentMode] = &[
    PaymentMode::Cash,
    PaymentMode::Upi,
    PaymentMode::BankTransfer,
    PaymentMode::Cheque,
];

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Parse command line arguments
    let args: Vec<String> = env::args().collect();

    let mut customers: usize = 25;
    let mut db_path = String::from("./khata_dev.db");

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--customers" | "-c" => {
                if i + 1 < args.len() {
                    customers = args[i + 1].parse().unwrap_or(25);
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
                println!("Khata Seed Data Generator");
                println!();
                println!("Usage: seed [OPTIONS]");
                println!();
                println!("Options:");
                println!("  -c, --customers <N>  Number of customers to generate (default: 25)");
                println!("  -d, --db <PATH>      Database file path (default: ./khata_dev.db)");
                println!("  -h, --help           Show this help message");
                return Ok(());
            }
            _ => {}
        }
        i += 1;
    }

    println!("🌱 Khata Seed Data Generator");
    println!("============================");
    println!("Database:  {}", db_path);
    println!("Customers: {}", customers);
    println!();

    let db = Database::new(DbConfig::new(&db_path)).await?;

    println!("✓ Connected to database");
    println!("✓ Migrations applied");

    let existing = db.customers().list().await?.len();
    if existing > 0 {
        println!("⚠ Database already has {} customers", existing);
        println!("  Skipping seed to avoid duplicates.");
        println!("  Delete the database file to regenerate.");
        return Ok(());
    }

    let start = std::time::Instant::now();

    // Inventory
    println!();
    println!("Creating inventory...");
    let mut products: Vec<Product> = Vec::new();
    for (company, lines) in CATALOGUE {
        for (idx, (name, price_cents, gst_bps)) in lines.iter().enumerate() {
            let mut product = db
                .inventory()
                .create_product(NewProduct {
                    name: name.to_string(),
                    sku: Some(format!("{}-{:02}", &company[..3].to_uppercase(), idx + 1)),
                    company: Some(company.to_string()),
                    unit: Some("pcs".to_string()),
                    gst_bps: *gst_bps,
                    price_cents: *price_cents,
                    cost_cents: price_cents * 85 / 100,
                    wholesale_cents: price_cents * 92 / 100,
                    stock: 40 + (idx as i64 * 15),
                })
                .await?;

            if idx % 2 == 0 {
                let restock = db
                    .inventory()
                    .add_batch(
                        &product.id,
                        NewBatch {
                            cost_price_cents: price_cents * 88 / 100,
                            selling_price_cents: *price_cents,
                            wholesale_price_cents: price_cents * 94 / 100,
                            stock: 24,
                            ..Default::default()
                        },
                    )
                    .await?;
                product.batches.push(restock);
            }
            products.push(product);
        }
    }
    println!("  {} products", products.len());

    // Customers, invoices, payments
    println!();
    println!("Creating customers and invoices...");
    let today = Utc::now();
    let mut invoices = 0;
    let mut payments = 0;

    for n in 0..customers {
        let first = FIRST_NAMES[n % FIRST_NAMES.len()];
        let kind = SHOP_KINDS[(n / FIRST_NAMES.len()) % SHOP_KINDS.len()];
        let customer = db
            .customers()
            .create(NewCustomer {
                name: format!("{} {} #{}", first, kind, n + 1),
                email: format!("{}.{}@example.in", first.to_lowercase(), n + 1),
                phone: format!("98{:08}", 10_000_000 + n * 7_919),
                city: Some(CITIES[n % CITIES.len()].to_string()),
            })
            .await?;

        let sale_count = 2 + n % 3;
        for s in 0..sale_count {
            let product = &products[(n * 5 + s * 3) % products.len()];
            let Some(batch) = product.batches.last() else {
                continue;
            };
            let quantity = 1 + ((n + s) % 6) as i64;

            db.sale_lifecycle()
                .create_sale(NewSale {
                    customer_id: customer.id.clone(),
                    items: vec![NewSaleItem {
                        product_id: Some(product.id.clone()),
                        batch_id: Some(batch.id.clone()),
                        name: product.name.clone(),
                        quantity,
                        unit_price_cents: batch.selling_price_cents,
                    }],
                    gst_bps: Some(product.gst_bps),
                    payment_status: (s == 0 && n % 4 == 0).then_some(PaymentStatus::Paid),
                    date: Some(today - Duration::days((90 - s * 25 - n % 7) as i64)),
                    ..Default::default()
                })
                .await?;
            invoices += 1;
        }

        if n % 5 != 4 {
            let balance = db.customers().balance(&customer.id).await?;
            let amount_cents = balance.outstanding_cents * (40 + (n % 4) as i64 * 20) / 100;
            if amount_cents > 0 {
                db.payment_ledger()
                    .add_payment(NewPayment {
                        customer_id: customer.id.clone(),
                        amount_cents,
                        date: Some(today - Duration::days((n % 10) as i64)),
                        payment_mode: Some(MODES[n % MODES.len()]),
                        reference: None,
                    })
                    .await?;
                payments += 1;
            }
        }
    }

    let elapsed = start.elapsed();
    println!();
    println!(
        "✓ Generated {} customers, {} invoices, {} payments in {:?}",
        customers, invoices, payments, elapsed
    );

    println!();
    println!("✓ Seed complete!");

    db.close().await;
    Ok(())
}
