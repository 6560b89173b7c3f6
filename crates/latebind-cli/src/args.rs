use anyhow::{bail, Context};
use chrono::NaiveDateTime;
use clap::{Parser, Subcommand, ValueEnum};

use latebind::{CallKind, Currency, Date, Value};

/// Drive an in-process automation object by name
#[derive(Parser)]
#[command(name = "latebind")]
#[command(version)]
#[command(about = "Late-bound calls against a demo automation object", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Items fetched per batch when enumerating
    #[arg(long, global = true, default_value_t = 100)]
    pub batch: u32,

    /// Trace every call phase (needs LATEBIND_LOG=trace to show)
    #[arg(long, global = true)]
    pub trace: bool,
}

#[derive(Subcommand)]
pub enum Commands {
    /// List the demo object's members
    Members {
        /// Print JSON
        #[arg(long)]
        json: bool,
    },
    /// Invoke a member by name
    Call {
        /// Member name
        member: String,

        /// Typed arguments: i32:5, i64:5, f64:1.5, str:text, bool:true,
        /// cy:5.25, date:2024-01-02T03:04:05, null, empty
        #[arg(value_name = "ARG", allow_hyphen_values = true)]
        args: Vec<String>,

        /// How to invoke the member
        #[arg(long, value_enum, default_value_t = KindArg::Method)]
        kind: KindArg,

        /// Print JSON
        #[arg(long)]
        json: bool,
    },
    /// Walk the demo collection
    Enumerate {
        /// Print JSON
        #[arg(long)]
        json: bool,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum KindArg {
    Method,
    Get,
    Put,
    Putref,
}

impl From<KindArg> for CallKind {
    fn from(kind: KindArg) -> Self {
        match kind {
            KindArg::Method => CallKind::Method,
            KindArg::Get => CallKind::PropertyGet,
            KindArg::Put => CallKind::PropertyPut,
            KindArg::Putref => CallKind::PropertyPutRef,
        }
    }
}

/// Parse one typed argument literal.
///
/// Untyped text is tried as an integer, then a float, and otherwise taken
/// as a string.
pub fn parse_literal(text: &str) -> anyhow::Result<Value> {
    match text {
        "null" => return Ok(Value::Null),
        "empty" => return Ok(Value::Empty),
        _ => {}
    }
    let Some((prefix, body)) = text.split_once(':') else {
        if let Ok(n) = text.parse::<i32>() {
            return Ok(Value::I32(n));
        }
        if let Ok(x) = text.parse::<f64>() {
            return Ok(Value::F64(x));
        }
        return Ok(Value::string(text));
    };
    let value = match prefix {
        "i32" => Value::I32(body.parse().with_context(|| format!("bad i32 `{}`", body))?),
        "i64" => Value::I64(body.parse().with_context(|| format!("bad i64 `{}`", body))?),
        "f64" => Value::F64(body.parse().with_context(|| format!("bad f64 `{}`", body))?),
        "str" => Value::string(body),
        "bool" => Value::Bool(body.parse().with_context(|| format!("bad bool `{}`", body))?),
        "cy" => {
            let amount: f64 = body.parse().with_context(|| format!("bad currency `{}`", body))?;
            Value::Currency(Currency::from_f64(amount))
        }
        "date" => {
            let dt = NaiveDateTime::parse_from_str(body, "%Y-%m-%dT%H:%M:%S")
                .with_context(|| format!("bad date `{}`", body))?;
            Value::Date(Date::from_datetime(dt)?)
        }
        _ => bail!("unknown literal type `{}` in `{}`", prefix, text),
    };
    Ok(value)
}
