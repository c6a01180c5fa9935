use anyhow::Result;
use clap::Parser;
use logrelay_redis::{RedisProducerOptions, RedisStore, DEFAULT_MAX_LEN, DEFAULT_NOTIFICATION_CHANNEL};
use logrelay_types::{StoreUrl, StreamKey};
use tokio::io::{AsyncBufReadExt, BufReader};

#[derive(Debug, Parser)]
struct Args {
    #[clap(
        long,
        help = "Redis URL, i.e. try `redis://localhost`",
        env = "REDIS_URL"
    )]
    url: StoreUrl,
    #[clap(long, help = "Stream key to append to", env = "STREAM_KEY")]
    stream: String,
    #[clap(
        long,
        help = "Send this many generated records instead of reading lines from stdin"
    )]
    count: Option<usize>,
    #[clap(long, help = "Approximate cap on the stream length", default_value_t = DEFAULT_MAX_LEN)]
    max_len: usize,
    #[clap(long, help = "Channel to announce new records on", default_value = DEFAULT_NOTIFICATION_CHANNEL)]
    channel: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::init();

    let Args {
        url,
        stream,
        count,
        max_len,
        channel,
    } = Args::parse();
    let stream = StreamKey::new(stream)?;

    let store = RedisStore::connect(url.clone(), Default::default()).await?;
    let mut options = RedisProducerOptions::default();
    options
        .set_max_len(Some(max_len))
        .set_notification_channel(Some(channel));
    let producer = store.create_producer(stream.clone(), options).await?;

    let mut sent = 0;
    match count {
        Some(count) => {
            for i in 0..count {
                let payload = format!("{{\"Level\":\"Information\",\"Message\":\"hi {i}\"}}");
                producer.send(&payload)?;
                sent += 1;
            }
        }
        None => {
            let mut lines = BufReader::new(tokio::io::stdin()).lines();
            while let Some(line) = lines.next_line().await? {
                if line.is_empty() {
                    continue;
                }
                producer.send(&line)?;
                sent += 1;
            }
        }
    }
    producer.end().await?;
    log::info!("Appended {sent} records to {stream} on {url}");

    Ok(())
}
