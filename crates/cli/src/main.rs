//! Souk CLI - shop the marketplace from a terminal.
//!
//! # Usage
//!
//! ```bash
//! # Sign in (the token is kept in SOUK_TOKEN_PATH when set)
//! souk login -e buyer@example.com -p secret
//!
//! # Browse the catalog
//! souk products --search coffee --max-price 500
//! souk product harar-coffee
//!
//! # Check out two bags with cash on delivery
//! souk checkout --item harar-coffee=2 --full-name "Abebe Kebede" \
//!     --phone +251911000000 --address "Bole Road 12" --city "Addis Ababa" \
//!     --payment cod
//!
//! # Seller desk
//! souk list-product --name "Guji Beans" --category 1 --price 420 --stock 8
//! souk wallet
//! souk withdraw --amount 500 --bank "Commercial Bank of Ethiopia" --account 1000123456789
//! ```
//!
//! # Commands
//!
//! - `login`, `register`, `logout`, `whoami` - Session management
//! - `products`, `product`, `categories` - Public catalog
//! - `wishlist` - List, add, remove, or toggle wishlist entries
//! - `orders`, `order`, `checkout`, `verify-payment` - Orders and payments
//! - `list-product`, `edit-product`, `delete-product` - Seller listings
//! - `wallet`, `withdraw`, `seller-orders` - Seller desk

#![cfg_attr(not(test), forbid(unsafe_code))]

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use rust_decimal::Decimal;
use sentry::integrations::tracing as sentry_tracing;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use souk_core::{CategoryId, OrderId, PaymentMethod, ProductId, Role, Severity};
use souk_storefront::{Storefront, StorefrontConfig};

mod commands;

use commands::CliError;

#[derive(Parser)]
#[command(name = "souk")]
#[command(author, version, about = "Souk marketplace storefront")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Sign in with email and password
    Login {
        #[arg(short, long)]
        email: String,

        #[arg(short, long, env = "SOUK_PASSWORD", hide_env_values = true)]
        password: String,
    },
    /// Create a new account
    Register(RegisterArgs),
    /// Sign out and forget the stored token
    Logout,
    /// Show the signed-in account
    Whoami,
    /// Update the signed-in account's profile
    Profile {
        #[arg(short, long)]
        name: Option<String>,

        #[arg(long)]
        phone: Option<String>,

        #[arg(long)]
        business_name: Option<String>,

        /// Path to a new profile image
        #[arg(long)]
        image: Option<PathBuf>,
    },
    /// Search the catalog
    Products(ProductArgs),
    /// Show one product by slug
    Product { slug: String },
    /// List product categories
    Categories,
    /// Manage the wishlist
    Wishlist {
        #[command(subcommand)]
        action: Option<WishlistAction>,
    },
    /// List your orders
    Orders,
    /// Show one of your orders
    Order { order_id: OrderId },
    /// Buy products
    Checkout(CheckoutArgs),
    /// Check whether a hosted payment went through
    VerifyPayment {
        /// Transaction reference returned by the payment page
        tx_ref: String,
    },
    /// Put a new product up for sale
    ListProduct(ListingArgs),
    /// Replace one of your listings
    EditProduct {
        product_id: ProductId,

        #[command(flatten)]
        listing: ListingArgs,
    },
    /// Take one of your listings down
    DeleteProduct { product_id: ProductId },
    /// Show the seller wallet
    Wallet,
    /// Request a payout from the seller wallet
    Withdraw {
        #[arg(short, long)]
        amount: Decimal,

        #[arg(short, long)]
        bank: String,

        #[arg(long)]
        account: String,
    },
    /// List orders that contain your products
    SellerOrders,
}

#[derive(clap::Args)]
struct RegisterArgs {
    #[arg(short, long)]
    name: String,

    #[arg(short, long)]
    email: String,

    #[arg(short, long, env = "SOUK_PASSWORD", hide_env_values = true)]
    password: String,

    /// Defaults to the password when omitted
    #[arg(long)]
    confirm_password: Option<String>,

    #[arg(long)]
    phone: Option<String>,

    /// Account role (`customer`, `seller`)
    #[arg(short, long, default_value = "customer")]
    role: Role,

    /// Required by sellers, ignored for customers
    #[arg(long)]
    business_name: Option<String>,

    /// Path to a profile image
    #[arg(long)]
    image: Option<PathBuf>,
}

#[derive(clap::Args)]
struct ProductArgs {
    #[arg(short, long)]
    search: Option<String>,

    /// Category slug
    #[arg(short, long)]
    category: Option<String>,

    #[arg(long)]
    min_price: Option<Decimal>,

    #[arg(long)]
    max_price: Option<Decimal>,

    /// Backend sort key (e.g. `price_asc`, `newest`)
    #[arg(long)]
    sort: Option<String>,

    #[arg(long)]
    page: Option<u32>,

    #[arg(long)]
    limit: Option<u32>,
}

#[derive(clap::Args)]
struct ListingArgs {
    #[arg(short, long)]
    name: String,

    #[arg(short, long)]
    description: Option<String>,

    /// Category id (see `souk categories`)
    #[arg(short, long)]
    category: CategoryId,

    #[arg(short, long)]
    price: Decimal,

    #[arg(long)]
    discount_price: Option<Decimal>,

    #[arg(short, long, default_value_t = 0)]
    stock: u32,

    /// Weight with unit, e.g. "2 kg"
    #[arg(long)]
    weight: Option<String>,

    /// Dimensions with unit, e.g. "30x20x10 cm"
    #[arg(long)]
    dimensions: Option<String>,
}

impl From<ListingArgs> for souk_storefront::gateway::ProductDraft {
    fn from(args: ListingArgs) -> Self {
        Self {
            name: args.name,
            description: args.description,
            category_id: args.category,
            price: args.price.into(),
            discount_price: args.discount_price.map(Into::into),
            stock_quantity: args.stock,
            weight: args.weight,
            dimensions: args.dimensions,
        }
    }
}

#[derive(Subcommand)]
enum WishlistAction {
    /// List wishlist entries (default)
    List,
    /// Add a product
    Add { product_id: ProductId },
    /// Remove a product
    Remove { product_id: ProductId },
    /// Add the product if absent, remove it otherwise
    Toggle { product_id: ProductId },
}

#[derive(clap::Args)]
struct CheckoutArgs {
    /// Product to buy as `slug=quantity` (repeatable; quantity defaults to 1)
    #[arg(short, long = "item", required = true)]
    items: Vec<String>,

    #[arg(long)]
    full_name: String,

    #[arg(long)]
    phone: String,

    #[arg(long)]
    address: String,

    #[arg(long)]
    city: String,

    #[arg(long)]
    state: Option<String>,

    #[arg(long)]
    postal_code: Option<String>,

    /// Payment method (`chapa`, `cod`)
    #[arg(long, default_value = "chapa")]
    payment: PaymentMethod,
}

/// Initialize Sentry error tracking and return guard that must be kept alive.
fn init_sentry(config: &StorefrontConfig) -> Option<sentry::ClientInitGuard> {
    let dsn = config.sentry_dsn.as_ref()?;

    let guard = sentry::init((
        dsn.as_str(),
        sentry::ClientOptions {
            release: sentry::release_name!(),
            environment: config
                .sentry_environment
                .clone()
                .map(std::borrow::Cow::Owned),
            sample_rate: config.sentry_sample_rate,
            attach_stacktrace: true,
            ..Default::default()
        },
    ));

    tracing::info!("Sentry initialized");
    Some(guard)
}

/// Filter tracing events to Sentry event types.
fn sentry_event_filter(metadata: &tracing::Metadata<'_>) -> sentry_tracing::EventFilter {
    match *metadata.level() {
        tracing::Level::ERROR | tracing::Level::WARN => sentry_tracing::EventFilter::Event,
        tracing::Level::INFO | tracing::Level::DEBUG => sentry_tracing::EventFilter::Breadcrumb,
        _ => sentry_tracing::EventFilter::Ignore,
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let config = match StorefrontConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            tracing_subscriber::fmt::init();
            tracing::error!("Failed to load configuration: {e}");
            std::process::exit(1);
        }
    };

    // Sentry must be initialized before the tracing subscriber
    let _sentry_guard = init_sentry(&config);

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "souk_storefront=info,souk=info".into());

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer().without_time().with_target(false))
        .with(sentry_tracing::layer().event_filter(sentry_event_filter))
        .init();

    let result = run(cli, &config).await;

    if let Err(e) = result {
        tracing::error!("Command failed: {e}");
        std::process::exit(1);
    }
}

async fn run(cli: Cli, config: &StorefrontConfig) -> Result<(), CliError> {
    let storefront = Storefront::new(config)?;
    storefront.restore_session().await;

    let result = dispatch(&storefront, cli.command).await;
    report_notifications(&storefront);
    result
}

async fn dispatch(storefront: &Storefront, command: Commands) -> Result<(), CliError> {
    match command {
        Commands::Login { email, password } => {
            commands::auth::login(storefront, &email, &password).await?;
        }
        Commands::Register(args) => {
            let form = commands::auth::RegisterForm {
                confirm_password: args.confirm_password.unwrap_or_else(|| args.password.clone()),
                name: args.name,
                email: args.email,
                password: args.password,
                phone: args.phone,
                role: args.role,
                business_name: args.business_name,
                image: args.image,
            };
            commands::auth::register(storefront, form).await?;
        }
        Commands::Logout => commands::auth::logout(storefront),
        Commands::Whoami => commands::auth::whoami(storefront)?,
        Commands::Profile {
            name,
            phone,
            business_name,
            image,
        } => {
            commands::auth::update_profile(storefront, name, phone, business_name, image).await?;
        }
        Commands::Products(args) => {
            let query = souk_storefront::gateway::ProductQuery {
                search: args.search,
                category: args.category,
                min_price: args.min_price.map(Into::into),
                max_price: args.max_price.map(Into::into),
                sort: args.sort,
                page: args.page,
                limit: args.limit,
            };
            commands::shop::products(storefront, &query).await?;
        }
        Commands::Product { slug } => commands::shop::product(storefront, &slug).await?,
        Commands::Categories => commands::shop::categories(storefront).await?,
        Commands::Wishlist { action } => match action.unwrap_or(WishlistAction::List) {
            WishlistAction::List => commands::shop::wishlist(storefront)?,
            WishlistAction::Add { product_id } => {
                commands::shop::wishlist_add(storefront, product_id).await?;
            }
            WishlistAction::Remove { product_id } => {
                commands::shop::wishlist_remove(storefront, product_id).await?;
            }
            WishlistAction::Toggle { product_id } => {
                commands::shop::wishlist_toggle(storefront, product_id).await?;
            }
        },
        Commands::Orders => commands::shop::orders(storefront)?,
        Commands::Order { order_id } => commands::shop::order(storefront, order_id).await?,
        Commands::Checkout(args) => {
            let address = souk_storefront::gateway::ShippingAddress {
                full_name: args.full_name,
                phone: args.phone,
                address_line: args.address,
                city: args.city,
                state: args.state,
                postal_code: args.postal_code,
            };
            commands::shop::checkout(storefront, &args.items, address, args.payment).await?;
        }
        Commands::VerifyPayment { tx_ref } => {
            commands::shop::verify_payment(storefront, &tx_ref).await?;
        }
        Commands::ListProduct(listing) => {
            commands::seller::create_product(storefront, &listing.into()).await?;
        }
        Commands::EditProduct {
            product_id,
            listing,
        } => commands::seller::update_product(storefront, product_id, &listing.into()).await?,
        Commands::DeleteProduct { product_id } => {
            commands::seller::delete_product(storefront, product_id).await?;
        }
        Commands::Wallet => commands::seller::wallet(storefront).await?,
        Commands::Withdraw {
            amount,
            bank,
            account,
        } => commands::seller::withdraw(storefront, amount, bank, account).await?,
        Commands::SellerOrders => commands::seller::orders(storefront).await?,
    }
    Ok(())
}

/// Surface anything the storefront queued for the user before exiting.
fn report_notifications(storefront: &Storefront) {
    for notification in storefront.notifier().active() {
        match notification.severity {
            Severity::Error => tracing::error!("{}", notification.message),
            Severity::Warning => tracing::warn!("{}", notification.message),
            Severity::Info | Severity::Success => tracing::info!("{}", notification.message),
        }
    }
}
