use clap::{Args, Parser, Subcommand};
use serde_json::{Value, json};
use storefront::config::ConfigError;
use storefront::services::catalog::{CatalogError, CatalogSource, ProductId};
use storefront::services::filter::PriceBucket;
use storefront::services::registry::Role;
use storefront::services::remote_auth::RemoteAuthError;
use storefront::services::session::{AuthError, RegisterPayload, Registration, SessionError};
use storefront::services::token::expires_at;
use storefront::{ErrorCode, Storefront, StorefrontConfig};
use tracing_subscriber::EnvFilter;

#[derive(Debug, thiserror::Error)]
enum CliError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("{code}: {0}", code = .0.error_code())]
    Session(#[from] SessionError),
    #[error("{code}: {0}", code = .0.error_code())]
    Catalog(#[from] CatalogError),
    #[error("remote auth setup failed: {0}")]
    RemoteAuth(#[from] RemoteAuthError),
    #[error(transparent)]
    Auth(#[from] AuthError),
    #[error("invalid JSON payload: {0}")]
    InvalidJson(#[from] serde_json::Error),
}

#[derive(Parser, Debug)]
#[command(name = "storefront", about = "Storefront session, cart and catalog CLI")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    Register(RegisterArgs),
    Login {
        /// Email or username.
        identifier: String,
        #[arg(long, env = "STOREFRONT_PASSWORD")]
        password: String,
    },
    Logout,
    Whoami,
    Cart(CartCommand),
    Fav(FavCommand),
    /// Set the persisted search term.
    Search { term: String },
    Products(ProductsArgs),
    Categories,
}

#[derive(Args, Debug)]
struct RegisterArgs {
    #[arg(long)]
    email: String,
    #[arg(long)]
    username: String,
    #[arg(long, env = "STOREFRONT_PASSWORD")]
    password: String,
    #[arg(long, default_value = "")]
    given_name: String,
    #[arg(long, default_value = "")]
    family_name: String,
    #[arg(long, default_value = "user", value_parser = parse_role)]
    role: Role,
}

#[derive(Args, Debug)]
struct CartCommand {
    #[command(subcommand)]
    command: CartSubcommand,
}

#[derive(Subcommand, Debug)]
enum CartSubcommand {
    Add { id: ProductId },
    Dec { id: ProductId },
    Remove { id: ProductId },
    Toggle { id: ProductId },
    /// Print lines and totals priced against the remote catalog.
    Show,
}

#[derive(Args, Debug)]
struct FavCommand {
    #[command(subcommand)]
    command: FavSubcommand,
}

#[derive(Subcommand, Debug)]
enum FavSubcommand {
    Toggle { id: ProductId },
    List,
}

#[derive(Args, Debug)]
struct ProductsArgs {
    /// Repeat to select several categories.
    #[arg(long = "category")]
    categories: Vec<String>,
    /// `under-50`, `50-150` or `150-300`.
    #[arg(long)]
    price: Option<PriceBucket>,
    /// Replace the persisted search term before filtering.
    #[arg(long)]
    search: Option<String>,
}

#[tokio::main]
async fn main() -> Result<(), CliError> {
    let _ = dotenvy::dotenv();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let storefront = Storefront::open(StorefrontConfig::from_env()?)?;
    tracing::debug!(data_dir = %storefront.config().data_dir.display(), "storefront cli ready");

    match cli.command {
        Command::Register(args) => run_register(&storefront, args).await,
        Command::Login { identifier, password } => {
            let session = storefront.session().login(&identifier, &password).await?;
            print_json(&session_json(&session.identity, session.role, &session.token))
        }
        Command::Logout => {
            storefront.logout();
            println!("ok");
            Ok(())
        }
        Command::Whoami => {
            let session = storefront.session().require_session()?;
            print_json(&session_json(&session.identity, session.role, &session.token))
        }
        Command::Cart(cart) => run_cart(&storefront, cart).await,
        Command::Fav(fav) => run_fav(&storefront, fav),
        Command::Search { term } => {
            storefront.cart().set_search_term(&term);
            println!("ok");
            Ok(())
        }
        Command::Products(args) => run_products(&storefront, args).await,
        Command::Categories => {
            let catalog = storefront.http_catalog()?;
            let categories = catalog.list_categories().await?;
            print_json(&json!(categories))
        }
    }
}

async fn run_register(storefront: &Storefront, args: RegisterArgs) -> Result<(), CliError> {
    let payload = RegisterPayload {
        email: args.email,
        username: args.username,
        password: args.password,
        given_name: args.given_name,
        family_name: args.family_name,
    };
    match storefront.session().register(&payload, args.role).await? {
        Registration::Created => println!("registered; log in to continue"),
        Registration::SignedIn(session) => {
            print_json(&session_json(&session.identity, session.role, &session.token))?;
        }
    }
    Ok(())
}

async fn run_cart(storefront: &Storefront, cart: CartCommand) -> Result<(), CliError> {
    let store = storefront.cart();
    match cart.command {
        CartSubcommand::Add { id } => store.add_to_cart(id),
        CartSubcommand::Dec { id } => store.decrement_cart_item(id),
        CartSubcommand::Remove { id } => store.remove_cart_item(id),
        CartSubcommand::Toggle { id } => store.toggle_cart_item(id),
        CartSubcommand::Show => {
            let view = storefront.summary_view();
            let catalog = storefront.http_catalog()?;
            view.set_products(catalog.list_products().await?);
            return print_json(&serde_json::to_value(view.summary())?);
        }
    }
    print_json(&json!({ "items": store.cart_items(), "count": store.cart_count() }))
}

fn run_fav(storefront: &Storefront, fav: FavCommand) -> Result<(), CliError> {
    let store = storefront.cart();
    match fav.command {
        FavSubcommand::Toggle { id } => {
            let favorite = store.toggle_favorite(id);
            print_json(&json!({ "id": id, "favorite": favorite }))
        }
        FavSubcommand::List => print_json(&json!(store.favorites())),
    }
}

async fn run_products(storefront: &Storefront, args: ProductsArgs) -> Result<(), CliError> {
    if let Some(term) = &args.search {
        storefront.cart().set_search_term(term);
    }
    let engine = storefront.filter_engine();
    for category in &args.categories {
        if !engine.is_category_selected(category) {
            engine.toggle_category(category);
        }
    }
    engine.set_price_bucket(args.price);

    let catalog = storefront.http_catalog()?;
    engine.refresh(&catalog).await?;

    let rows: Vec<Value> = engine
        .filtered()
        .iter()
        .map(|p| {
            json!({
                "id": p.id,
                "title": p.title,
                "category": p.category,
                "price": p.price,
                "favorite": storefront.cart().is_favorite(p.id),
                "in_cart": storefront.cart().is_in_cart(p.id),
            })
        })
        .collect();
    print_json(&json!(rows))
}

fn session_json(identity: &str, role: Role, token: &str) -> Value {
    json!({ "identity": identity, "role": role, "expires_at": expires_at(token) })
}

fn parse_role(raw: &str) -> Result<Role, String> {
    match raw.trim().to_lowercase().as_str() {
        "user" => Ok(Role::User),
        "admin" => Ok(Role::Admin),
        other => Err(format!("unknown role '{other}' (expected user or admin)")),
    }
}

fn print_json(value: &Value) -> Result<(), CliError> {
    let rendered = serde_json::to_string_pretty(value)?;
    println!("{rendered}");
    Ok(())
}
