pub mod app;
pub mod calendar;
pub mod categories;
pub mod cli;
pub mod commands;
pub mod config;
pub mod datetime;
pub mod error;
pub mod i18n;
pub mod notify;
pub mod prefs;
pub mod render;
pub mod storage;
pub mod store;
pub mod task;
pub mod views;

use std::ffi::OsString;
use std::rc::Rc;

use anyhow::Context;
use chrono::Utc;
use clap::Parser;
use tracing::{
  debug,
  info
};

#[tracing::instrument(skip_all)]
pub fn run(
  raw_args: Vec<OsString>
) -> anyhow::Result<()> {
  let pre =
    cli::preprocess_args(&raw_args);
  let cli = cli::GlobalCli::parse_from(
    pre.cleaned_args
  );

  cli::init_tracing(
    cli.verbose,
    cli.quiet
  )?;

  info!(
    verbose = cli.verbose,
    quiet = cli.quiet,
    "starting daybook CLI"
  );
  debug!(?pre.rc_overrides, "preprocessed rc overrides");

  let mut cfg = config::Config::load(
    cli.rc_file.as_deref()
  )?;
  cfg.apply_overrides(
    pre.rc_overrides.into_iter().chain(
      cli
        .rc_overrides
        .into_iter()
        .map(|kv| (kv.key, kv.value))
    )
  );

  let data_dir =
    config::resolve_data_dir(
      &cfg,
      cli.data.as_deref()
    )
    .context(
      "failed to resolve data \
       directory"
    )?;

  let storage =
    storage::FileStorage::open(
      &data_dir
    )
    .with_context(|| {
      format!(
        "failed to open storage at {}",
        data_dir.display()
      )
    })?;

  let options = app::AppOptions {
    timezone: datetime::resolve_timezone(
      cfg.get("timezone").as_deref()
    ),
    lookahead: cfg.notify_lookahead()?
  };
  let mut app =
    app::App::open(Rc::new(storage), options);

  let renderer =
    render::Renderer::new(&cfg)?;
  let mut out = std::io::stdout().lock();

  commands::dispatch(
    &mut app,
    &renderer,
    &mut out,
    cli.command,
    Utc::now()
  )?;

  info!("done");
  Ok(())
}
