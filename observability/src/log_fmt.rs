use std::fmt::{self, Write};

use nu_ansi_term::{Color, Style};
use time::{format_description::OwnedFormatItem, OffsetDateTime};
use tracing::{
    field::{Field, Visit},
    Event, Level, Subscriber,
};
use tracing_subscriber::{
    fmt::{format::Writer, FmtContext, FormatEvent, FormatFields},
    registry::LookupSpan,
};

const TIME_FORMAT: &str = "[hour]:[minute]:[second].[subsecond digits:3]";

/// Field naming the ledger an event is about.
const LEDGER_FIELD: &str = "ledger";

/// A `#` followed by a nine digit ledger index.
const LEDGER_COLUMN_WIDTH: usize = 10;

/// Progress oriented event format.
///
/// `time LEVEL #ledger message key=value ...`, in UTC. The `ledger` field of an event gets its
/// own column, left blank for events about no particular ledger, so that messages line up
/// while a run walks the ledgers.
pub struct EtlFormat {
    time_format: Option<OwnedFormatItem>,
}

/// Fields of one event, split into the parts of the line.
#[derive(Default)]
struct EventLine {
    ledger: Option<String>,
    message: String,
    fields: Vec<(&'static str, String)>,
}

impl<S, N> FormatEvent<S, N> for EtlFormat
where
    S: Subscriber + for<'a> LookupSpan<'a>,
    N: for<'a> FormatFields<'a> + 'static,
{
    fn format_event(
        &self,
        _ctx: &FmtContext<'_, S, N>,
        mut writer: Writer<'_>,
        event: &Event<'_>,
    ) -> fmt::Result {
        let mut line = EventLine::default();
        event.record(&mut line);

        let timestamp = self
            .time_format
            .as_ref()
            .and_then(|format| OffsetDateTime::now_utc().format(format).ok())
            .unwrap_or_else(|| "--:--:--.---".to_string());
        paint(&mut writer, Style::new().dimmed(), &timestamp)?;
        writer.write_char(' ')?;

        let level = *event.metadata().level();
        paint(&mut writer, level_style(level), &format!("{:>5}", level.to_string()))?;
        writer.write_char(' ')?;

        let ledger = line
            .ledger
            .as_ref()
            .map(|ledger| format!("#{ledger}"))
            .unwrap_or_default();
        paint(
            &mut writer,
            Style::new().bold().fg(Color::Cyan),
            &format!("{:<width$}", ledger, width = LEDGER_COLUMN_WIDTH),
        )?;
        writer.write_char(' ')?;

        writer.write_str(&line.message)?;

        for (name, value) in &line.fields {
            writer.write_char(' ')?;
            let key_style = if *name == "err" || *name == "error" {
                Style::new().fg(Color::Red)
            } else {
                Style::new().italic()
            };
            paint(&mut writer, key_style, name)?;
            write!(writer, "={value}")?;
        }

        writeln!(writer)
    }
}

impl EventLine {
    fn push(&mut self, field: &Field, value: String) {
        match field.name() {
            "message" => self.message = value,
            LEDGER_FIELD => self.ledger = Some(value),
            name => self.fields.push((name, value)),
        }
    }
}

impl Visit for EventLine {
    fn record_u64(&mut self, field: &Field, value: u64) {
        self.push(field, value.to_string());
    }

    fn record_i64(&mut self, field: &Field, value: i64) {
        self.push(field, value.to_string());
    }

    fn record_bool(&mut self, field: &Field, value: bool) {
        self.push(field, value.to_string());
    }

    fn record_str(&mut self, field: &Field, value: &str) {
        self.push(field, value.to_string());
    }

    fn record_error(&mut self, field: &Field, value: &(dyn std::error::Error + 'static)) {
        self.push(field, value.to_string());
    }

    fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
        self.push(field, format!("{value:?}"));
    }
}

impl Default for EtlFormat {
    fn default() -> Self {
        let time_format = time::format_description::parse_owned::<2>(TIME_FORMAT).ok();
        Self { time_format }
    }
}

fn level_style(level: Level) -> Style {
    let color = match level {
        Level::ERROR => Color::Red,
        Level::WARN => Color::Yellow,
        Level::INFO => Color::Green,
        Level::DEBUG => Color::Blue,
        Level::TRACE => Color::Purple,
    };
    Style::new().bold().fg(color)
}

fn paint(writer: &mut Writer<'_>, style: Style, text: &str) -> fmt::Result {
    if writer.has_ansi_escapes() {
        write!(writer, "{}", style.paint(text))
    } else {
        writer.write_str(text)
    }
}

#[cfg(test)]
mod tests {
    use std::{
        io,
        sync::{Arc, Mutex},
    };

    use tracing_subscriber::{fmt::MakeWriter, prelude::*};

    use super::EtlFormat;

    #[derive(Clone, Default)]
    struct Buffer(Arc<Mutex<Vec<u8>>>);

    impl io::Write for Buffer {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    impl<'a> MakeWriter<'a> for Buffer {
        type Writer = Buffer;

        fn make_writer(&'a self) -> Self::Writer {
            self.clone()
        }
    }

    fn capture(f: impl FnOnce()) -> Vec<String> {
        let buffer = Buffer::default();
        let subscriber = tracing_subscriber::registry().with(
            tracing_subscriber::fmt::layer()
                .with_ansi(false)
                .with_writer(buffer.clone())
                .event_format(EtlFormat::default()),
        );
        tracing::subscriber::with_default(subscriber, f);

        let output = buffer.0.lock().unwrap().clone();
        String::from_utf8(output)
            .unwrap()
            .lines()
            .map(|line| line.split_once(' ').unwrap().1.to_string())
            .collect()
    }

    #[test]
    fn test_ledger_column() {
        let lines = capture(|| {
            tracing::info!(ledger = 32570u64, rows = 12, "ledger stored");
            tracing::warn!(table = "transactions", "starting ingestion");
        });

        assert_eq!(
            lines,
            vec![
                " INFO #32570     ledger stored rows=12",
                " WARN            starting ingestion table=transactions",
            ]
        );
    }
}
