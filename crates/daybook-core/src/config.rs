use std::collections::HashMap;
use std::fs;
use std::path::{
  Path,
  PathBuf
};

use anyhow::{
  Context,
  anyhow
};
use chrono::{
  Duration,
  Utc
};
use tracing::{
  debug,
  info,
  trace,
  warn
};

use crate::notify::DEFAULT_LOOKAHEAD_HOURS;

pub const RC_ENV_VAR: &str =
  "DAYBOOKRC";

const DEFAULTS: [(&str, &str); 2] = [
  ("data.location", "~/.daybook"),
  ("color", "on")
];

/// Flat `key = value` settings read from
/// `~/.daybookrc` and its includes.
#[derive(Debug, Clone)]
pub struct Config {
  map: HashMap<String, String>,
  pub loaded_files: Vec<PathBuf>
}

#[derive(Debug, PartialEq, Eq)]
enum RcLine<'a> {
  Include(&'a str),
  Set(&'a str, &'a str)
}

impl Default for Config {
  fn default() -> Self {
    let mut map: HashMap<String, String> =
      DEFAULTS
        .iter()
        .map(|(k, v)| {
          (k.to_string(), v.to_string())
        })
        .collect();
    map.insert(
      "notify.lookahead".to_string(),
      DEFAULT_LOOKAHEAD_HOURS.to_string()
    );
    Self {
      map,
      loaded_files: Vec::new()
    }
  }
}

impl Config {
  #[tracing::instrument(skip(
    rc_override
  ))]
  pub fn load(
    rc_override: Option<&Path>
  ) -> anyhow::Result<Self> {
    let mut cfg = Config::default();

    match resolve_rc_path(rc_override) {
      | Some(path) => {
        info!(rc = %path.display(), "loading daybookrc");
        cfg.load_file(&path)?;
      }
      | None => {
        debug!(
          "no daybookrc found; using \
           defaults"
        );
      }
    }

    Ok(cfg)
  }

  /// Command-line overrides win over
  /// file values. An `rc.` prefix is
  /// accepted and dropped.
  pub fn apply_overrides<I>(
    &mut self,
    overrides: I
  ) where
    I: IntoIterator<
      Item = (String, String)
    >
  {
    for (key, value) in overrides {
      let key = key
        .strip_prefix("rc.")
        .map(str::to_string)
        .unwrap_or(key);
      debug!(key = %key, value = %value, "applying override");
      self.map.insert(key, value);
    }
  }

  pub fn get(
    &self,
    key: &str
  ) -> Option<String> {
    self.map.get(key).cloned()
  }

  pub fn get_bool(
    &self,
    key: &str
  ) -> Option<bool> {
    self
      .map
      .get(key)
      .map(|v| parse_bool(v))
  }

  /// Window in which due tasks produce
  /// notifications.
  pub fn notify_lookahead(
    &self
  ) -> anyhow::Result<Duration> {
    let Some(raw) =
      self.map.get("notify.lookahead")
    else {
      return Ok(Duration::hours(
        DEFAULT_LOOKAHEAD_HOURS
      ));
    };
    let hours: i64 =
      raw.trim().parse().with_context(
        || {
          format!(
            "notify.lookahead must be \
             a whole number of hours, \
             got '{raw}'"
          )
        }
      )?;
    if hours <= 0 {
      return Err(anyhow!(
        "notify.lookahead must be \
         positive, got {hours}"
      ));
    }
    Duration::try_hours(hours)
      .filter(|window| {
        Utc::now()
          .checked_add_signed(*window)
          .is_some()
      })
      .ok_or_else(|| {
        anyhow!(
          "notify.lookahead is out of \
           range: {hours}"
        )
      })
  }

  #[tracing::instrument(skip(self))]
  fn load_file(
    &mut self,
    path: &Path
  ) -> anyhow::Result<()> {
    let path = expand_tilde(path);
    let text =
      fs::read_to_string(&path)
        .with_context(|| {
          format!(
            "failed to read {}",
            path.display()
          )
        })?;
    self.loaded_files.push(path.clone());

    let base_dir = path
      .parent()
      .map_or_else(
        || PathBuf::from("."),
        Path::to_path_buf
      );

    for (idx, raw_line) in
      text.lines().enumerate()
    {
      let parsed = parse_rc_line(raw_line)
        .with_context(|| {
          format!(
            "{}:{}",
            path.display(),
            idx + 1
          )
        })?;

      match parsed {
        | None => {}
        | Some(RcLine::Set(key, value)) => {
          trace!(key, value, "loaded config key");
          self.map.insert(
            key.to_string(),
            value.to_string()
          );
        }
        | Some(RcLine::Include(target)) => {
          self.include(&base_dir, target)?;
        }
      }
    }

    Ok(())
  }

  fn include(
    &mut self,
    base_dir: &Path,
    target: &str
  ) -> anyhow::Result<()> {
    let target = expand_tilde(Path::new(
      target
    ));
    let path = if target.is_absolute() {
      target
    } else {
      base_dir.join(target)
    };

    if self.loaded_files.contains(&path) {
      warn!(include = %path.display(), "include cycle; skipping");
      return Ok(());
    }
    if !path.exists() {
      warn!(include = %path.display(), "include file does not exist; skipping");
      return Ok(());
    }
    self.load_file(&path)
  }
}

/// Blank and comment-only lines yield
/// `None`.
fn parse_rc_line(
  raw: &str
) -> anyhow::Result<Option<RcLine<'_>>> {
  let line = raw
    .split_once('#')
    .map_or(raw, |(before, _)| before)
    .trim();
  if line.is_empty() {
    return Ok(None);
  }

  if let Some(target) =
    line.strip_prefix("include ")
  {
    let target = target.trim();
    if target.is_empty() {
      return Err(anyhow!(
        "include path cannot be empty"
      ));
    }
    return Ok(Some(RcLine::Include(
      target
    )));
  }

  let (key, value) = line
    .split_once('=')
    .ok_or_else(|| {
      anyhow!(
        "expected 'key = value' or \
         'include PATH', got: {raw}"
      )
    })?;
  let key = key.trim();
  if key.is_empty() {
    return Err(anyhow!(
      "missing key before '=': {raw}"
    ));
  }
  Ok(Some(RcLine::Set(key, value.trim())))
}

/// Creates the directory if needed.
/// `--data` beats `data.location`.
#[tracing::instrument(skip(
  cfg,
  override_dir
))]
pub fn resolve_data_dir(
  cfg: &Config,
  override_dir: Option<&Path>
) -> anyhow::Result<PathBuf> {
  let dir = match override_dir {
    | Some(path) => path.to_path_buf(),
    | None => match cfg.get("data.location")
    {
      | Some(value) => {
        expand_tilde(Path::new(&value))
      }
      | None => dirs::home_dir()
        .map(|home| home.join(".daybook"))
        .ok_or_else(|| {
          anyhow!(
            "cannot determine home \
             directory"
          )
        })?
    }
  };

  if !dir.is_dir() {
    info!(dir = %dir.display(), "creating data directory");
  }
  fs::create_dir_all(&dir)
    .with_context(|| {
      format!(
        "failed to create {}",
        dir.display()
      )
    })?;

  Ok(dir)
}

/// `--rc-file`, then `$DAYBOOKRC`
/// (`/dev/null` disables), then
/// `~/.daybookrc` when present.
fn resolve_rc_path(
  override_path: Option<&Path>
) -> Option<PathBuf> {
  if let Some(path) = override_path {
    return Some(path.to_path_buf());
  }

  if let Ok(from_env) =
    std::env::var(RC_ENV_VAR)
  {
    return (from_env != "/dev/null")
      .then(|| PathBuf::from(from_env));
  }

  let Some(home) = dirs::home_dir()
  else {
    warn!(
      "cannot determine home \
       directory; skipping daybookrc"
    );
    return None;
  };
  let candidate =
    home.join(".daybookrc");
  candidate
    .exists()
    .then_some(candidate)
}

fn expand_tilde(
  path: &Path
) -> PathBuf {
  let text = path.to_string_lossy();
  if let Some(rest) =
    text.strip_prefix("~/")
    && let Some(home) = dirs::home_dir()
  {
    return home.join(rest);
  }
  path.to_path_buf()
}

pub(crate) fn parse_bool(s: &str) -> bool {
  matches!(
    s.trim()
      .to_ascii_lowercase()
      .as_str(),
    "1" | "y" | "yes" | "on" | "true"
  )
}
