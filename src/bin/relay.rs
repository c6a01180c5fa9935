use anyhow::Result;
use clap::Parser;
use logrelay::{
    elastic::{ElasticOptions, ElasticSink},
    export::{futures::future::try_join_all, url::Url},
    redis::{RedisConnectOptions, RedisStore, DEFAULT_NOTIFICATION_CHANNEL},
    shutdown_channel, AnyTrigger, AutoStreamReset, ConsumerGroup, ConsumerId, DeliveryPort,
    Engine, EngineOptions, PollTrigger, SignalTrigger, StoreUrl, StreamKey, DEFAULT_BATCH_SIZE,
    DEFAULT_RETRY_LIMIT,
};
use std::{sync::Arc, time::Duration};

#[derive(Debug, Parser)]
#[command(about = "Relay log records from Redis Streams to Elasticsearch")]
struct Args {
    #[clap(long, help = "Redis URL, i.e. `redis://localhost`", env = "REDIS_URL")]
    redis: StoreUrl,
    #[clap(
        long,
        help = "Stream key to relay; repeat for several",
        env = "STREAM_KEY",
        value_delimiter = ',',
        default_value = "logs"
    )]
    stream: Vec<String>,
    #[clap(long, help = "Consumer group, defaults to the program name", env = "GROUP")]
    group: Option<String>,
    #[clap(long, help = "Consumer id, defaults to the host name", env = "CONSUMER_ID")]
    consumer: Option<String>,
    #[clap(long, help = "Records per read", default_value_t = DEFAULT_BATCH_SIZE)]
    batch_size: usize,
    #[clap(long, help = "Reclaim entries idle for longer than this (ms)", default_value_t = 5000)]
    idle_threshold_ms: u64,
    #[clap(long, help = "Interval of health checks (ms)", default_value_t = 30000)]
    health_check_interval_ms: u64,
    #[clap(long, help = "Fallback poll interval when no notification arrives (ms)", default_value_t = 5000)]
    poll_interval_ms: u64,
    #[clap(long, help = "Relaunches before giving up", default_value_t = DEFAULT_RETRY_LIMIT)]
    retry_limit: u32,
    #[clap(long, help = "Time given to runners to stop (ms)", default_value_t = 10000)]
    shutdown_grace_ms: u64,
    #[clap(long, help = "Warn about Redis commands slower than this (ms)", default_value_t = 500)]
    slow_command_ms: u64,
    #[clap(long, help = "Maximum number of concurrent drains across all streams")]
    concurrency_limit: Option<usize>,
    #[clap(long, help = "A new group replays the stream from the beginning")]
    from_earliest: bool,
    #[clap(long, help = "Trim records older than this many days")]
    retention_days: Option<u64>,
    #[clap(long, help = "Channel producers announce new records on", default_value = DEFAULT_NOTIFICATION_CHANNEL)]
    channel: String,
    #[clap(long, help = "Elasticsearch URL, i.e. `http://localhost:9200`", env = "ELASTIC_URL")]
    elastic: Url,
    #[clap(long, help = "Elasticsearch API key", env = "ELASTIC_API_KEY", hide_env_values = true)]
    elastic_api_key: Option<String>,
    #[clap(long, help = "Prefix of index names", default_value = "log-")]
    index_prefix: String,
    #[clap(long, help = "Date suffix of index names, in `time` format description syntax")]
    index_date_format: Option<String>,
    #[clap(long, help = "Do not install the index template")]
    no_template: bool,
    #[clap(long, help = "Accept invalid TLS certificates from Elasticsearch")]
    insecure: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::init();

    let args = Args::parse();

    let mut elastic = ElasticOptions::new(args.elastic.clone());
    elastic
        .set_api_key(args.elastic_api_key.clone())
        .set_index_prefix(args.index_prefix.clone())
        .set_accept_invalid_certs(args.insecure);
    if let Some(format) = &args.index_date_format {
        elastic.set_index_date_format(Some(format.clone()));
    }
    if args.no_template {
        elastic.set_template(None);
    }
    let port: Arc<dyn DeliveryPort> = Arc::new(ElasticSink::new(elastic)?);

    let mut redis = RedisConnectOptions::from_url(&args.redis);
    redis.set_slow_command_threshold(Some(Duration::from_millis(args.slow_command_ms)));
    let store = Arc::new(RedisStore::connect(args.redis.clone(), redis).await?);

    let mut engines: Vec<Engine<RedisStore>> = Vec::new();
    for stream in args.stream.iter() {
        let engine = Engine::new(store.clone(), port.clone(), engine_options(&args, stream)?)?;
        let engine = match engines.first() {
            Some(first) => engine.share_limiters(first),
            None => engine,
        };
        engines.push(engine);
    }

    let (mut handle, shutdown) = shutdown_channel();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => log::info!("Interrupted, shutting down"),
            Err(err) => log::error!("Failed to listen for Ctrl-C: {err}"),
        }
        handle.trigger();
    });

    let mut runs = Vec::new();
    for engine in engines.iter() {
        let trigger = AnyTrigger::new(
            SignalTrigger::new(store.subscribe(&args.channel).await?),
            PollTrigger::new(Duration::from_millis(args.poll_interval_ms)),
        );
        runs.push(engine.run(Box::new(trigger), shutdown.clone()));
    }
    try_join_all(runs).await?;
    log::info!("Bye");

    Ok(())
}

fn engine_options(args: &Args, stream: &str) -> Result<EngineOptions> {
    let mut options = EngineOptions::new(StreamKey::new(stream.trim())?);
    options
        .set_batch_size(args.batch_size)
        .set_idle_threshold(Duration::from_millis(args.idle_threshold_ms))
        .set_health_check_interval(Duration::from_millis(args.health_check_interval_ms))
        .set_retry_limit(args.retry_limit)
        .set_shutdown_grace(Duration::from_millis(args.shutdown_grace_ms))
        .set_concurrency_limit(args.concurrency_limit)
        .set_auto_stream_reset(if args.from_earliest {
            AutoStreamReset::Earliest
        } else {
            AutoStreamReset::Latest
        })
        .set_retention(
            args.retention_days
                .map(|days| Duration::from_secs(days * 24 * 60 * 60)),
        );
    if let Some(group) = &args.group {
        options.set_group(ConsumerGroup::new(group.as_str()));
    }
    if let Some(consumer) = &args.consumer {
        options.set_consumer_id(ConsumerId::new(consumer.as_str()));
    }
    Ok(options)
}
