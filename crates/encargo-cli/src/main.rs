use std::path::PathBuf;

use anyhow::{anyhow, Context, Result};
use clap::{Args, Parser, Subcommand};
use encargo_browse::{
    BrowseView, CategoryFilter, Distance, FilterUpdate, LocationFilter, PriceRange, SortOrder,
    Viewport, WorkType,
};
use encargo_geo::{GeoConfig, LocationResolver, ReportedPosition};
use encargo_listings::listing_source_for;

mod logging;

#[derive(Debug, Parser)]
#[command(name = "encargo-cli")]
#[command(about = "Encargo services marketplace command-line interface")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Run the web UI.
    Serve,
    /// Print the listings that match a set of filters.
    Browse(BrowseArgs),
    /// Resolve a location through the device, IP and default chain.
    Locate(LocateArgs),
}

#[derive(Debug, Args)]
struct BrowseArgs {
    #[arg(long, default_value = "sample")]
    source: String,
    #[arg(long)]
    workspace_root: Option<PathBuf>,
    #[arg(long)]
    query: Option<String>,
    #[arg(long)]
    category: Option<String>,
    #[arg(long)]
    location: Option<String>,
    #[arg(long)]
    price: Option<String>,
    #[arg(long)]
    sort: Option<String>,
    #[arg(long)]
    include_assigned: bool,
    #[arg(long)]
    no_offers: bool,
    #[arg(long)]
    work_type: Option<String>,
    #[arg(long)]
    distance: Option<i64>,
}

#[derive(Debug, Args)]
struct LocateArgs {
    #[arg(long, allow_hyphen_values = true)]
    lat: Option<f64>,
    #[arg(long, allow_hyphen_values = true)]
    lon: Option<f64>,
    /// Browser geolocation error code (1 denied, 2 unavailable, 3 timeout).
    #[arg(long)]
    error_code: Option<u16>,
}

impl BrowseArgs {
    fn updates(&self) -> Result<Vec<FilterUpdate>> {
        let mut updates = Vec::new();
        if let Some(q) = &self.query {
            updates.push(FilterUpdate::SearchQuery(q.clone()));
        }
        if let Some(label) = &self.category {
            let filter = CategoryFilter::from_label(label)
                .ok_or_else(|| anyhow!("unknown category {label:?}"))?;
            updates.push(FilterUpdate::Category(filter));
        }
        if let Some(label) = &self.location {
            let filter = LocationFilter::from_label(label)
                .ok_or_else(|| anyhow!("unknown location {label:?}"))?;
            updates.push(FilterUpdate::Location(filter));
        }
        if let Some(label) = &self.price {
            let range =
                PriceRange::from_label(label).ok_or_else(|| anyhow!("unknown price range {label:?}"))?;
            updates.push(FilterUpdate::PriceRange(range));
        }
        if let Some(label) = &self.sort {
            let order =
                SortOrder::from_label(label).ok_or_else(|| anyhow!("unknown sort order {label:?}"))?;
            updates.push(FilterUpdate::SortBy(order));
        }
        if self.include_assigned {
            updates.push(FilterUpdate::AvailableOnly(false));
        }
        if self.no_offers {
            updates.push(FilterUpdate::NoOffersOnly(true));
        }
        if let Some(value) = &self.work_type {
            let work_type =
                WorkType::from_value(value).ok_or_else(|| anyhow!("unknown work type {value:?}"))?;
            updates.push(FilterUpdate::WorkType(work_type));
        }
        if let Some(km) = self.distance {
            updates.push(FilterUpdate::Distance(Distance::new(km)));
        }
        Ok(updates)
    }
}

async fn browse(args: BrowseArgs) -> Result<()> {
    let root = args
        .workspace_root
        .clone()
        .unwrap_or_else(|| PathBuf::from("."));
    let source = listing_source_for(&args.source, &root)?
        .ok_or_else(|| anyhow!("unknown listing source {}", args.source))?;
    let catalog = source
        .fetch_listings()
        .await
        .with_context(|| format!("loading listings from {}", source.source_id()))?;

    let mut view = BrowseView::new(Viewport::Desktop);
    for update in args.updates()? {
        view.filters.apply(update);
    }

    let results = view.results(&catalog);
    println!(
        "{} resultados ({} filtros activos)",
        results.len(),
        view.active_filter_count()
    );
    if results.is_empty() {
        println!("No hay resultados que coincidan con tus filtros");
    }
    for listing in results {
        println!(
            "#{:<3} {:<40} {:>9}  {:<12} {}  [{}]",
            listing.id,
            listing.title,
            listing.budget_label(),
            listing.category.label(),
            listing.location,
            listing.offers_label()
        );
    }
    Ok(())
}

async fn locate(args: LocateArgs) -> Result<()> {
    let resolver = LocationResolver::from_config(&GeoConfig::from_env())?;
    let report = ReportedPosition::from_parts(args.lat, args.lon, args.error_code);
    let outcome = resolver.resolve(&report).await;
    println!(
        "{:.4},{:.4} source={:?}",
        outcome.fix.coordinates.latitude, outcome.fix.coordinates.longitude, outcome.fix.source
    );
    if let Some(reason) = outcome.failure {
        println!("fallback: {reason}");
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    logging::init_logging(logging::Environment::from_env());

    let cli = Cli::parse();

    match cli.command.unwrap_or(Commands::Serve) {
        Commands::Serve => encargo_web::serve_from_env().await?,
        Commands::Browse(args) => browse(args).await?,
        Commands::Locate(args) => locate(args).await?,
    }

    Ok(())
}
