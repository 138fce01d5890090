use std::time::Duration;

use tokio_util::sync::CancellationToken;

use bridge_api::{Consumer, PluginError, RecordValue, preview_text};

const PREVIEW_BYTES: usize = 1024;

/// Прочитать и залогировать `n` записей. Пустые poll'ы и транспортные
/// ошибки логируются и не считаются. Consumer не закрывается:
/// им владеет вызывающий.
///
/// Возвращает число показанных записей (меньше `n` только при отмене)
/// или фатальную ошибку consumer'а.
pub async fn preview(
    consumer: &mut dyn Consumer,
    n: usize,
    poll_timeout: Duration,
    token: &CancellationToken,
) -> Result<usize, PluginError> {
    let topic = consumer.topic().to_string();
    tracing::info!(topic = %topic, count = n, "previewing records");

    let mut shown = 0;
    while shown < n {
        let polled = tokio::select! {
            biased;
            _ = token.cancelled() => {
                tracing::info!(topic = %topic, shown, "preview cancelled");
                break;
            }
            polled = consumer.poll(poll_timeout) => polled,
        };
        match polled {
            Ok(Some(record)) => {
                shown += 1;
                tracing::info!(
                    topic = %topic,
                    offset = record.offset,
                    "[{shown}] {}",
                    display_value(&record.value)
                );
            }
            Ok(None) => tracing::info!(topic = %topic, "no new record"),
            Err(e) if e.is_fatal() => return Err(e),
            Err(e) => tracing::error!(topic = %topic, error = ?e, "preview poll error"),
        }
    }
    Ok(shown)
}

fn display_value(value: &RecordValue) -> String {
    match value.raw_bytes() {
        Some(bytes) => preview_text(&bytes, PREVIEW_BYTES),
        None => format!("<{}>", value.kind_name()),
    }
}
