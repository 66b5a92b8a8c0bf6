use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{ArgAction, Args, Parser, Subcommand};
use permit_store_api::{BrowseRequest, BrowserConfig, PermitBrowserApi, API_CONTRACT_VERSION};
use permit_store_core::{LatLng, LatLngBounds, PermitField, PermitId, SortSpec};
use serde_json::Value;
use tracing::debug;

mod logging;

const CLI_CONTRACT_VERSION: &str = "cli.v1";

#[derive(Debug, Parser)]
#[command(name = "pz")]
#[command(about = "Permit browser data layer CLI")]
struct Cli {
    /// JSON permit snapshot; overrides `permits_path` from the config.
    #[arg(long, global = true)]
    permits: Option<PathBuf>,

    /// YAML browser config.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Filter, sort and select, then print the visible permits.
    List(BrowseArgs),
    /// Print the bounding box of the visible permits.
    Bounds(BrowseArgs),
    /// Print one permit.
    Show(ShowArgs),
}

#[derive(Debug, Args)]
struct BrowseArgs {
    #[arg(long)]
    search: Option<String>,
    #[arg(long = "authority")]
    authorities: Vec<String>,
    #[arg(long = "type")]
    types: Vec<String>,
    /// Reference point as `lat,lng`.
    #[arg(long, value_parser = parse_lat_lng)]
    near: Option<LatLng>,
    #[arg(long = "radius")]
    radius_meters: Option<f64>,
    #[arg(long, value_parser = parse_field)]
    sort: Option<PermitField>,
    #[arg(long, requires = "sort")]
    desc: bool,
    #[arg(long)]
    select: Option<String>,
}

#[derive(Debug, Args)]
struct ShowArgs {
    #[arg(long)]
    id: String,
}

fn parse_lat_lng(value: &str) -> Result<LatLng, String> {
    let (lat, lng) =
        value.split_once(',').ok_or_else(|| format!("expected `lat,lng`, got `{value}`"))?;
    let lat: f64 = lat.trim().parse().map_err(|err| format!("invalid latitude `{lat}`: {err}"))?;
    let lng: f64 = lng.trim().parse().map_err(|err| format!("invalid longitude `{lng}`: {err}"))?;
    let point = LatLng::new(lat, lng);
    if !point.is_valid() {
        return Err(format!("`{value}` is outside lat [-90, 90] / lng [-180, 180]"));
    }
    Ok(point)
}

fn parse_field(value: &str) -> Result<PermitField, String> {
    value.parse::<PermitField>().map_err(|_| {
        let known: Vec<&str> = PermitField::ALL.iter().map(|field| field.as_str()).collect();
        format!("unknown field `{value}`; expected one of: {}", known.join(", "))
    })
}

impl BrowseArgs {
    fn into_request(self) -> BrowseRequest {
        BrowseRequest {
            search: self.search,
            authorities: self.authorities,
            types: self.types,
            near: self.near,
            radius_meters: self.radius_meters,
            sort: self.sort.map(|field| SortSpec { field, descending: self.desc }),
            select: self.select.map(PermitId),
        }
    }
}

fn with_contract_version(value: Value) -> Value {
    match value {
        Value::Object(mut object) => {
            object.insert(
                "contract_version".to_string(),
                Value::String(CLI_CONTRACT_VERSION.to_string()),
            );
            object.insert(
                "api_contract_version".to_string(),
                Value::String(API_CONTRACT_VERSION.to_string()),
            );
            Value::Object(object)
        }
        other => serde_json::json!({
            "contract_version": CLI_CONTRACT_VERSION,
            "api_contract_version": API_CONTRACT_VERSION,
            "payload": other
        }),
    }
}

fn emit_json(value: Value) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(&with_contract_version(value))?);
    Ok(())
}

fn load_config(cli: &Cli) -> Result<BrowserConfig> {
    let mut config = match &cli.config {
        Some(path) => BrowserConfig::load(path)?,
        None => BrowserConfig::default(),
    };
    if let Some(permits) = &cli.permits {
        config.permits_path = Some(permits.clone());
    }
    debug!(permits = ?config.permits_path, "resolved browser config");
    Ok(config)
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    logging::init_logging(cli.verbose)?;
    let api = PermitBrowserApi::new(load_config(&cli)?);

    match cli.command {
        Command::List(args) => run_list(&api, args),
        Command::Bounds(args) => run_bounds(&api, args),
        Command::Show(args) => run_show(&api, &args),
    }
}

fn run_list(api: &PermitBrowserApi, args: BrowseArgs) -> Result<()> {
    let result = api.browse(&args.into_request())?;
    emit_json(serde_json::to_value(&result).context("failed to serialize browse result")?)
}

fn run_bounds(api: &PermitBrowserApi, args: BrowseArgs) -> Result<()> {
    let result = api.browse(&args.into_request())?;
    emit_json(serde_json::json!({
        "total": result.total,
        "visible_count": result.visible_count,
        "active_filters": result.active_filters,
        "bounds": result.bounds,
        "center": result.bounds.as_ref().map(LatLngBounds::center),
    }))
}

fn run_show(api: &PermitBrowserApi, args: &ShowArgs) -> Result<()> {
    let permit = api.show(&PermitId::new(args.id.clone()))?;
    emit_json(serde_json::json!({ "permit": permit }))
}
