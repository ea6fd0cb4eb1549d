use std::sync::OnceLock;

use anyhow::{
  Context,
  anyhow
};
use chrono::{
  DateTime,
  Datelike,
  Days,
  Duration,
  LocalResult,
  NaiveDate,
  NaiveDateTime,
  NaiveTime,
  TimeZone,
  Utc,
  Weekday
};
use chrono_tz::Tz;
use regex::Regex;

pub const TIMEZONE_ENV_VAR: &str =
  "DAYBOOK_TIMEZONE";

/// Picks the timezone used for calendar
/// days: environment first, then the
/// configured value, then UTC.
pub fn resolve_timezone(
  configured: Option<&str>
) -> Tz {
  if let Ok(raw) =
    std::env::var(TIMEZONE_ENV_VAR)
    && let Some(tz) =
      parse_timezone(&raw, TIMEZONE_ENV_VAR)
  {
    return tz;
  }

  if let Some(raw) = configured
    && let Some(tz) =
      parse_timezone(raw, "config")
  {
    return tz;
  }

  chrono_tz::UTC
}

fn parse_timezone(
  raw: &str,
  source: &str
) -> Option<Tz> {
  let trimmed = raw.trim();
  if trimmed.is_empty() {
    tracing::warn!(
      source,
      "timezone source was empty"
    );
    return None;
  }

  match trimmed.parse::<Tz>() {
    | Ok(tz) => {
      tracing::debug!(
        source,
        timezone = %trimmed,
        "configured timezone"
      );
      Some(tz)
    }
    | Err(err) => {
      tracing::error!(
        source,
        timezone = %trimmed,
        error = %err,
        "failed to parse timezone id"
      );
      None
    }
  }
}

#[must_use]
pub fn local_date(
  dt: DateTime<Utc>,
  tz: &Tz
) -> NaiveDate {
  dt.with_timezone(tz).date_naive()
}

#[must_use]
pub fn format_local(
  dt: DateTime<Utc>,
  tz: &Tz,
  fmt: &str
) -> String {
  dt.with_timezone(tz)
    .format(fmt)
    .to_string()
}

pub fn to_utc_from_local(
  local_naive: NaiveDateTime,
  tz: &Tz,
  context: &str
) -> anyhow::Result<DateTime<Utc>> {
  match tz
    .from_local_datetime(&local_naive)
  {
    | LocalResult::Single(local_dt) => {
      Ok(local_dt.with_timezone(&Utc))
    }
    | LocalResult::Ambiguous(
      first,
      second
    ) => {
      tracing::warn!(
        context,
        %first,
        %second,
        "ambiguous local time; taking the earlier instant"
      );
      Ok(first.min(second).with_timezone(&Utc))
    }
    | LocalResult::None => Err(anyhow!(
      "{local_naive} falls in a \
       daylight-saving gap in {tz} \
       ({context})"
    ))
  }
}

const FORMAT_HINT: &str =
  "try now, today, tomorrow, \
   yesterday, a weekday, a clock \
   time (15:30 or 3:30pm), +3d / \
   -2h / +45m, YYYY-MM-DD, \
   YYYY-MM-DD HH:MM, RFC 3339, or \
   a day followed by a clock time";

const LOCAL_FORMATS: [&str; 2] =
  ["%Y-%m-%d %H:%M", "%Y-%m-%dT%H:%M"];

const WEEKDAYS: [(&str, Weekday); 7] = [
  ("monday", Weekday::Mon),
  ("tuesday", Weekday::Tue),
  ("wednesday", Weekday::Wed),
  ("thursday", Weekday::Thu),
  ("friday", Weekday::Fri),
  ("saturday", Weekday::Sat),
  ("sunday", Weekday::Sun)
];

/// Parses a due-date expression.
/// Local forms resolve in `tz`; a bare
/// clock time already past today means
/// tomorrow.
#[tracing::instrument(skip(now, tz), fields(input = input))]
pub fn parse_date_expr(
  input: &str,
  now: DateTime<Utc>,
  tz: &Tz
) -> anyhow::Result<DateTime<Utc>> {
  let token = input.trim();

  if token.eq_ignore_ascii_case("now") {
    return Ok(now);
  }

  if let Some(offset) =
    parse_offset(token)
  {
    return now
      .checked_add_signed(offset)
      .ok_or_else(|| {
        anyhow!(
          "date expression out of \
           range: {input}"
        )
      })
      .context(FORMAT_HINT);
  }

  if let Ok(fixed) =
    DateTime::parse_from_rfc3339(token)
  {
    return Ok(fixed.with_timezone(&Utc));
  }

  let Some(local) =
    parse_local(token, now, tz)
  else {
    return Err(anyhow!(
      "unrecognized date expression: \
       {input}"
    ))
    .context(FORMAT_HINT);
  };
  to_utc_from_local(local, tz, token)
}

fn parse_local(
  token: &str,
  now: DateTime<Utc>,
  tz: &Tz
) -> Option<NaiveDateTime> {
  if let Some(day) =
    parse_day_expr(token, now, tz)
  {
    return Some(
      day.and_time(NaiveTime::MIN)
    );
  }

  if let Some(time) =
    parse_clock_time(token)
  {
    let local_now = now
      .with_timezone(tz)
      .naive_local();
    let today =
      local_now.date().and_time(time);
    if today > local_now {
      return Some(today);
    }
    return today
      .checked_add_days(Days::new(1));
  }

  if let Some(explicit) = LOCAL_FORMATS
    .iter()
    .find_map(|fmt| {
      NaiveDateTime::parse_from_str(
        token, fmt
      )
      .ok()
    })
  {
    return Some(explicit);
  }

  let (day_part, clock_part) =
    token.split_once(' ')?;
  let day = parse_day_expr(
    day_part.trim(),
    now,
    tz
  )?;
  Some(
    day.and_time(parse_clock_time(
      clock_part
    )?)
  )
}

/// `+3d`, `-2h`, `+45m`.
fn parse_offset(
  token: &str
) -> Option<Duration> {
  let (sign, rest) =
    if let Some(rest) =
      token.strip_prefix('+')
    {
      (1, rest)
    } else {
      (-1, token.strip_prefix('-')?)
    };

  let unit = rest.chars().last()?;
  let digits =
    &rest[..rest.len() - unit.len_utf8()];
  if digits.is_empty()
    || !digits
      .bytes()
      .all(|b| b.is_ascii_digit())
  {
    return None;
  }
  let amount: i64 =
    digits.parse().ok()?;

  let offset = match unit {
    | 'd' => Duration::try_days(amount)?,
    | 'h' => {
      Duration::try_hours(amount)?
    }
    | 'm' => {
      Duration::try_minutes(amount)?
    }
    | _ => return None
  };
  Some(offset * sign)
}

fn parse_day_expr(
  token: &str,
  now: DateTime<Utc>,
  tz: &Tz
) -> Option<NaiveDate> {
  let today = local_date(now, tz);
  let lower =
    token.trim().to_ascii_lowercase();

  match lower.as_str() {
    | "today" => Some(today),
    | "tomorrow" => today.succ_opt(),
    | "yesterday" => today.pred_opt(),
    | other => {
      parse_weekday_name(other)
        .map(|day| {
          next_weekday_date(today, day)
        })
        .or_else(|| {
          NaiveDate::parse_from_str(
            other, "%Y-%m-%d"
          )
          .ok()
        })
    }
  }
}

/// Full names and prefixes of at least
/// three letters (`tue`, `thurs`).
fn parse_weekday_name(
  token: &str
) -> Option<Weekday> {
  if token.len() < 3 {
    return None;
  }
  WEEKDAYS
    .iter()
    .find(|(name, _)| {
      name.starts_with(token)
    })
    .map(|(_, day)| *day)
}

/// Strictly after `from`: naming
/// today's weekday means next week.
fn next_weekday_date(
  from: NaiveDate,
  target: Weekday
) -> NaiveDate {
  let ahead =
    match target.days_since(from.weekday()) {
      | 0 => 7,
      | n => n
    };
  from
    .checked_add_days(Days::new(
      u64::from(ahead)
    ))
    .unwrap_or(from)
}

fn clock_regex() -> Option<&'static Regex> {
  static CLOCK: OnceLock<Option<Regex>> =
    OnceLock::new();
  CLOCK
    .get_or_init(|| {
      Regex::new(
        r"(?i)^(?P<hour>\d{1,2}):(?P<minute>\d{2})\s*(?P<ampm>[ap]m)?$"
      )
      .map_err(|err| {
        tracing::error!(
          error = %err,
          "clock pattern failed to compile"
        );
      })
      .ok()
    })
    .as_ref()
}

/// `15:30`, `3:30pm`, `12:05 AM`.
fn parse_clock_time(
  token: &str
) -> Option<NaiveTime> {
  let captures = clock_regex()?
    .captures(token.trim())?;
  let hour: u32 =
    captures["hour"].parse().ok()?;
  let minute: u32 =
    captures["minute"].parse().ok()?;

  let hour = match captures
    .name("ampm")
    .map(|m| m.as_str().to_ascii_lowercase())
  {
    | None => hour,
    | Some(_)
      if hour == 0 || hour > 12 =>
    {
      return None;
    }
    | Some(ampm) => {
      hour % 12
        + if ampm == "pm" { 12 } else { 0 }
    }
  };

  NaiveTime::from_hms_opt(hour, minute, 0)
}

#[cfg(test)]
mod tests {
  use chrono::{
    TimeZone,
    Utc
  };

  use super::{
    format_local,
    local_date,
    parse_date_expr
  };

  #[test]
  fn parses_day_with_clock_time() {
    let tz = chrono_tz::Asia::Taipei;
    let now = Utc
      .with_ymd_and_hms(
        2024, 1, 2, 12, 0, 0
      )
      .single()
      .expect("valid now");
    let parsed = parse_date_expr(
      "tomorrow 9:30am",
      now,
      &tz
    )
    .expect("parse tomorrow");
    assert_eq!(
      format_local(
        parsed,
        &tz,
        "%Y-%m-%d %H:%M"
      ),
      "2024-01-03 09:30"
    );
  }

  #[test]
  fn parses_weekday_name() {
    let tz = chrono_tz::UTC;
    let now = Utc
      .with_ymd_and_hms(
        2026, 2, 17, 12, 0, 0
      )
      .single()
      .expect("valid now");
    let parsed =
      parse_date_expr("wednesday", now, &tz)
        .expect("parse weekday");
    assert_eq!(
      local_date(parsed, &tz)
        .format("%Y-%m-%d")
        .to_string(),
      "2026-02-18"
    );
  }

  #[test]
  fn clock_time_in_past_rolls_forward() {
    let tz = chrono_tz::UTC;
    let now = Utc
      .with_ymd_and_hms(
        2024, 6, 1, 18, 0, 0
      )
      .single()
      .expect("valid now");
    let parsed =
      parse_date_expr("09:00", now, &tz)
        .expect("parse clock");
    assert_eq!(
      parsed,
      Utc
        .with_ymd_and_hms(
          2024, 6, 2, 9, 0, 0
        )
        .single()
        .expect("valid")
    );
  }

  #[test]
  fn relative_and_explicit_forms() {
    let tz = chrono_tz::UTC;
    let now = Utc
      .with_ymd_and_hms(
        2024, 6, 1, 18, 0, 0
      )
      .single()
      .expect("valid now");
    assert_eq!(
      parse_date_expr("+2h", now, &tz)
        .expect("relative"),
      now + chrono::Duration::hours(2)
    );
    assert_eq!(
      format_local(
        parse_date_expr(
          "2024-07-04 13:15",
          now,
          &tz
        )
        .expect("explicit"),
        &tz,
        "%Y-%m-%dT%H:%M"
      ),
      "2024-07-04T13:15"
    );
    assert!(
      parse_date_expr("someday", now, &tz)
        .is_err()
    );
  }

  #[test]
  fn offsets_and_weekday_prefixes() {
    let tz = chrono_tz::UTC;
    let now = Utc
      .with_ymd_and_hms(
        2024, 6, 1, 18, 0, 0
      )
      .single()
      .expect("valid now");
    assert_eq!(
      parse_date_expr("-1d", now, &tz)
        .expect("offset"),
      now - chrono::Duration::days(1)
    );
    assert!(
      parse_date_expr("+-1d", now, &tz)
        .is_err()
    );
    // 2024-06-01 is a Saturday.
    assert_eq!(
      format_local(
        parse_date_expr("thurs", now, &tz)
          .expect("weekday"),
        &tz,
        "%Y-%m-%d"
      ),
      "2024-06-06"
    );
    assert_eq!(
      format_local(
        parse_date_expr("sat 12:05 AM", now, &tz)
          .expect("weekday clock"),
        &tz,
        "%Y-%m-%d %H:%M"
      ),
      "2024-06-08 00:05"
    );
  }

  #[test]
  fn huge_offset_is_an_error() {
    let tz = chrono_tz::UTC;
    let now = Utc
      .with_ymd_and_hms(
        2024, 3, 1, 9, 0, 0
      )
      .single()
      .expect("valid now");
    let err = parse_date_expr(
      "+100000000d",
      now,
      &tz
    )
    .expect_err("out of range");
    assert!(
      format!("{err:#}")
        .contains("out of range")
    );
    assert!(
      parse_date_expr("-100000000d", now, &tz)
        .is_err()
    );
  }
}
