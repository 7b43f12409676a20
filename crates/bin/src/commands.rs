//! Subcommand handlers.

use crate::csv_io::{frame_rows, import_observations, write_frame_csv};
use crate::{
    ConfigCommand, FactorCommand, FactorRef, FavoriteCommand, ModelCommand, PositionCommand,
};
use chrono::NaiveDate;
use factorhub::{CalculationRequest, FactorService, PortfolioService};
use factorhub_data::{
    FactorDefinition, FactorDefinitionUpdate, FactorModel, FactorQuery, FavoriteQuery,
    NewFactorDefinition, NewFactorModel, NewFavorite, NewPosition, PositionQuery, SqliteStore,
};
use factorhub_factors::{DataSource, FactorConfig, Mapping, ModelId};
use indicatif::{ProgressBar, ProgressStyle};
use serde_json::Value;
use std::error::Error;
use std::fs::File;
use std::path::Path;
use std::time::Duration as StdDuration;

type CmdResult = Result<(), Box<dyn Error>>;

/// Parse a mapping config given either as a full config object or as a bare
/// array of mappings.
fn parse_mappings(raw: &str, disabled: bool) -> Result<FactorConfig, Box<dyn Error>> {
    let value: Value = serde_json::from_str(raw)?;
    let mut config = if value.is_array() {
        FactorConfig::new(serde_json::from_value::<Vec<Mapping>>(value)?)
    } else {
        serde_json::from_value(value)?
    };
    if disabled {
        config.enabled = false;
    }
    Ok(config)
}

fn describe_mapping(mapping: &Mapping) -> String {
    let model = mapping
        .model()
        .map_or_else(|| "factor default".to_string(), |id| format!("model {id}"));
    match &mapping.codes {
        Some(codes) if !codes.is_empty() => {
            let codes: Vec<&str> = codes.iter().map(String::as_str).collect();
            format!("{model} <- {}", codes.join(", "))
        }
        _ => format!("{model} <- all other codes"),
    }
}

fn print_factor_row(factor: &FactorDefinition) {
    println!(
        "{:>4}  {:<20} {:<12} {:<20} {}",
        factor.id,
        factor.factor_name,
        factor.cn_name,
        factor.column_name,
        if factor.enabled { "enabled" } else { "disabled" }
    );
}

fn print_model_row(model: &FactorModel) {
    println!(
        "{:>4}  factor {:<4} {:<20} {:<8} {:<8} {}",
        model.id,
        model.factor_id,
        model.model_code,
        if model.is_default { "default" } else { "" },
        if model.enabled { "enabled" } else { "disabled" },
        model.config
    );
}

/// Shared state for one CLI invocation.
pub(crate) struct Context<'a> {
    service: FactorService<'a>,
    portfolio: PortfolioService<'a>,
    operator: Option<String>,
}

impl<'a> Context<'a> {
    pub(crate) fn new(store: &'a SqliteStore, operator: Option<String>) -> Self {
        Self {
            service: FactorService::new(store),
            portfolio: PortfolioService::new(store),
            operator,
        }
    }

    fn operator(&self) -> Option<&str> {
        self.operator.as_deref()
    }

    fn lookup(&self, factor: &FactorRef) -> Result<FactorDefinition, Box<dyn Error>> {
        Ok(match factor {
            FactorRef::Id(id) => self.service.factor(*id)?,
            FactorRef::Name(name) => self.service.factor_by_name(name)?,
        })
    }

    pub(crate) fn init(&self, force: bool) -> CmdResult {
        match self.service.seed_turnover_rate(force, self.operator())? {
            Some(report) => {
                println!("Created factor turnover_rate (id {})", report.factor_id);
                println!("  default model: {}", report.default_model.id);
                println!("  MA model:      {}", report.ma_model.id);
            }
            None => println!("turnover_rate already exists (use --force to recreate)"),
        }
        Ok(())
    }

    pub(crate) fn factor(&self, cmd: FactorCommand) -> CmdResult {
        match cmd {
            FactorCommand::List {
                enabled,
                order_by,
                order,
            } => {
                let factors = self.service.list_factors(&FactorQuery {
                    enabled: enabled.then_some(true),
                    order_by,
                    order,
                    ..Default::default()
                })?;
                if factors.is_empty() {
                    println!("No factors. Run `factorhub init` to create turnover_rate.");
                }
                for factor in &factors {
                    print_factor_row(factor);
                }
            }
            FactorCommand::Show { factor } => {
                let factor = self.lookup(&factor)?;
                println!("{}", serde_json::to_string_pretty(&factor)?);

                println!("\nModels:");
                for model in self.service.list_models(Some(factor.id))? {
                    print_model_row(&model);
                }

                match self.service.config(factor.id) {
                    Ok(stored) => {
                        println!(
                            "\nConfig ({}):",
                            if stored.config.enabled { "enabled" } else { "disabled" }
                        );
                        for (i, mapping) in stored.config.mappings.iter().enumerate() {
                            println!("  #{i}: {}", describe_mapping(mapping));
                        }
                    }
                    Err(e) if e.is_not_found() => println!("\nConfig: none"),
                    Err(e) => return Err(e.into()),
                }
            }
            FactorCommand::Create {
                name,
                cn_name,
                en_name,
                column,
                description,
                disabled,
            } => {
                let factor = self.service.create_factor(&NewFactorDefinition {
                    factor_name: name,
                    cn_name,
                    en_name,
                    column_name: column,
                    description,
                    enabled: !disabled,
                    created_by: self.operator.clone(),
                })?;
                println!("Created factor {} (id {})", factor.factor_name, factor.id);
            }
            FactorCommand::Delete { factor } => {
                let factor = self.lookup(&factor)?;
                self.service.delete_factor(factor.id)?;
                println!("Deleted factor {}", factor.factor_name);
            }
            FactorCommand::Enable { factor } => self.set_enabled(&factor, true)?,
            FactorCommand::Disable { factor } => self.set_enabled(&factor, false)?,
        }
        Ok(())
    }

    fn set_enabled(&self, factor: &FactorRef, enabled: bool) -> CmdResult {
        let factor = self.lookup(factor)?;
        let updated = self.service.update_factor(
            factor.id,
            &FactorDefinitionUpdate {
                enabled: Some(enabled),
                updated_by: self.operator.clone(),
                ..Default::default()
            },
        )?;
        print_factor_row(&updated);
        Ok(())
    }

    pub(crate) fn model(&self, cmd: ModelCommand) -> CmdResult {
        match cmd {
            ModelCommand::List { factor } => {
                let factor_id = factor.map(|f| self.lookup(&f)).transpose()?.map(|f| f.id);
                for model in self.service.list_models(factor_id)? {
                    print_model_row(&model);
                }
            }
            ModelCommand::Show { id } => {
                let model = self.service.model(ModelId(id))?;
                println!("{}", serde_json::to_string_pretty(&model)?);
            }
            ModelCommand::Create {
                factor,
                name,
                code,
                config,
                default,
            } => {
                let factor = self.lookup(&factor)?;
                let model = self.service.create_model(&NewFactorModel {
                    factor_id: factor.id,
                    model_name: name,
                    model_code: code,
                    config: serde_json::from_str(&config)?,
                    is_default: default,
                    enabled: true,
                    created_by: self.operator.clone(),
                })?;
                println!("Created model {} for {}", model.id, factor.factor_name);
            }
            ModelCommand::Delete { id } => {
                self.service.delete_model(ModelId(id))?;
                println!("Deleted model {id}");
            }
            ModelCommand::SetDefault { id } => {
                let model = self.service.set_default_model(ModelId(id))?;
                print_model_row(&model);
            }
        }
        Ok(())
    }

    pub(crate) fn config(&self, cmd: ConfigCommand) -> CmdResult {
        match cmd {
            ConfigCommand::Show { factor } => {
                let factor = self.lookup(&factor)?;
                let stored = self.service.config(factor.id)?;
                println!("{}", serde_json::to_string_pretty(&stored.config)?);
            }
            ConfigCommand::Set {
                factor,
                mappings,
                disabled,
            } => {
                let factor = self.lookup(&factor)?;
                let config = parse_mappings(&mappings, disabled)?;
                let stored = self.service.put_config(factor.id, &config, self.operator())?;
                println!(
                    "Stored {} mapping(s) for {}",
                    stored.config.mappings.len(),
                    factor.factor_name
                );
            }
            ConfigCommand::Delete { factor } => {
                let factor = self.lookup(&factor)?;
                self.service.delete_config(factor.id)?;
                println!("Deleted config of {}", factor.factor_name);
            }
        }
        Ok(())
    }

    pub(crate) fn resolve(&self, factor: &FactorRef, code: &str) -> CmdResult {
        let factor = self.lookup(factor)?;
        let resolution = self.service.resolve(factor.id, code)?;
        match resolution.model {
            Some(model) => println!(
                "{} {}: model {} ({}) via {}",
                factor.factor_name, code, model.id, model.model_code, resolution.matched
            ),
            None => println!(
                "{} {}: no model ({})",
                factor.factor_name, code, resolution.matched
            ),
        }
        Ok(())
    }

    pub(crate) fn import(&self, file: &Path, source: DataSource) -> CmdResult {
        let reader = File::open(file)?;
        let report = import_observations(self.service.store(), reader, source)?;
        println!(
            "Imported {} {source} rows for {} codes",
            report.rows, report.codes
        );
        Ok(())
    }

    pub(crate) fn calculate(
        &self,
        factor: &FactorRef,
        start: NaiveDate,
        end: NaiveDate,
        codes: Option<Vec<String>>,
    ) -> CmdResult {
        let factor = self.lookup(factor)?;
        let request = CalculationRequest {
            factor_id: factor.id,
            codes,
            start,
            end,
            created_by: self.operator.clone(),
        };

        let pb = ProgressBar::new(0);
        pb.set_style(
            ProgressStyle::default_bar()
                .template("{spinner:.green} [{bar:40.cyan/blue}] {pos}/{len} {msg}")?
                .progress_chars("█▓░"),
        );
        pb.enable_steady_tick(StdDuration::from_millis(100));
        pb.set_message(format!("Calculating {}...", factor.factor_name));

        let summary = self.service.calculate_with(&request, |code, done, total| {
            pb.set_length(total as u64);
            pb.set_position(done as u64);
            pb.set_message(code.to_string());
        });
        let summary = match summary {
            Ok(summary) => {
                pb.finish_with_message(format!("{} values written", summary.values_written));
                summary
            }
            Err(e) => {
                pb.finish_with_message("Failed!");
                return Err(e.into());
            }
        };

        println!("\nFactor:          {}", summary.factor_name);
        println!("Codes processed: {}", summary.codes_processed);
        println!("Values written:  {}", summary.values_written);
        println!("Null results:    {}", summary.null_results);
        if !summary.skipped.is_empty() {
            println!("Skipped:         {}", summary.skipped.join(", "));
        }
        for error in &summary.errors {
            println!("Error {}: {}", error.code, error.message);
        }
        Ok(())
    }

    pub(crate) fn results(
        &self,
        code: &str,
        factor: Option<&str>,
        start: Option<NaiveDate>,
        end: Option<NaiveDate>,
        csv: Option<&Path>,
    ) -> CmdResult {
        let df = self.service.results(code, factor, start, end)?;

        match csv {
            Some(path) if path.as_os_str() == "-" => write_frame_csv(&df, std::io::stdout())?,
            Some(path) => {
                write_frame_csv(&df, File::create(path)?)?;
                println!("Wrote {} rows to {}", df.height(), path.display());
            }
            None => {
                let (header, rows) = frame_rows(&df)?;
                if rows.is_empty() {
                    println!("No results for {code}");
                    return Ok(());
                }
                println!("{}", header.iter().map(|h| format!("{h:>14}")).collect::<String>());
                for row in rows {
                    println!("{}", row.iter().map(|c| format!("{c:>14}")).collect::<String>());
                }
            }
        }
        Ok(())
    }

    pub(crate) fn position(&self, cmd: PositionCommand) -> CmdResult {
        match cmd {
            PositionCommand::List {
                user,
                code,
                start,
                end,
                order_by,
            } => {
                let positions = self.portfolio.list_positions(
                    user,
                    &PositionQuery {
                        code,
                        start_date: start,
                        end_date: end,
                        order_by,
                        ..Default::default()
                    },
                )?;
                for p in &positions {
                    let profit = p
                        .profit_pct()
                        .map_or_else(|| "-".to_string(), |pct| format!("{pct:+.2}%"));
                    println!(
                        "{:>4}  {:<10} qty {:>10.0}  cost {:>8.3}  price {:>8}  {}",
                        p.id,
                        p.code,
                        p.quantity,
                        p.avg_cost,
                        p.current_price.map_or_else(|| "-".to_string(), |v| format!("{v:.3}")),
                        profit
                    );
                }
            }
            PositionCommand::Add {
                user,
                code,
                quantity,
                avg_cost,
                buy_date,
                price,
                comment,
            } => {
                let position = self.portfolio.create_position(&NewPosition {
                    user_id: user,
                    code,
                    quantity,
                    avg_cost,
                    buy_date,
                    current_price: price,
                    comment,
                    created_by: self.operator.clone(),
                })?;
                println!("Added position {} ({})", position.id, position.code);
            }
            PositionCommand::Remove { user, id } => {
                self.portfolio.delete_position(user, id)?;
                println!("Removed position {id}");
            }
        }
        Ok(())
    }

    pub(crate) fn favorite(&self, cmd: FavoriteCommand) -> CmdResult {
        match cmd {
            FavoriteCommand::List { user } => {
                for f in self.portfolio.list_favorites(user, &FavoriteQuery::default())? {
                    println!(
                        "{:>4}  {:<10} {}  {}",
                        f.id,
                        f.code,
                        f.fav_datetime.format("%Y-%m-%d %H:%M"),
                        f.comment.as_deref().unwrap_or_default()
                    );
                }
            }
            FavoriteCommand::Add {
                user,
                code,
                comment,
            } => {
                let favorite = self.portfolio.create_favorite(&NewFavorite {
                    user_id: user,
                    code,
                    comment,
                    fav_datetime: None,
                    created_by: self.operator.clone(),
                })?;
                println!("Added favorite {} ({})", favorite.id, favorite.code);
            }
            FavoriteCommand::Remove { user, id } => {
                self.portfolio.delete_favorite(user, id)?;
                println!("Removed favorite {id}");
            }
        }
        Ok(())
    }

    pub(crate) fn status(&self, db_path: &Path) -> CmdResult {
        let stats = self.service.store().stats()?;
        println!("Database: {}", db_path.display());
        println!("  Factors:      {}", stats.factors);
        println!("  Models:       {}", stats.models);
        println!("  Configs:      {}", stats.configs);
        println!("  Observations: {}", stats.observations);
        println!("  Results:      {}", stats.results);
        println!("  Positions:    {}", stats.positions);
        println!("  Favorites:    {}", stats.favorites);
        Ok(())
    }
}
