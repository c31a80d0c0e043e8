use chrono::Utc;
use clap::Parser;
use std::{process::ExitCode, sync::Arc};
use tracing::{error, info, warn};
use tracing_indicatif::IndicatifLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};
use velo_processor::{
    args::Args,
    collaborators::Collaborators,
    database::db::DbClient,
    messaging::{RabbitMqConfig, RabbitMqPublisher},
    model::{race_bonus::DefaultRaceBonus, stats_engine::DefaultStatsEngine},
    processor::WeeklyProcessor
};

#[tokio::main]
async fn main() -> ExitCode {
    dotenv::dotenv().ok();
    let args = Args::parse();

    let indicatif_layer = IndicatifLayer::new();
    tracing_subscriber::registry()
        .with(EnvFilter::new(&args.log_level))
        .with(tracing_subscriber::fmt::layer().with_writer(indicatif_layer.get_stderr_writer()))
        .with(indicatif_layer)
        .init();

    let client = match DbClient::connect(&args.connection_string).await {
        Ok(client) => Arc::new(client),
        Err(e) => {
            error!("Failed to connect to database: {}", e);
            error!("Application cannot start without a valid database connection");
            return ExitCode::FAILURE;
        }
    };

    let publisher = Arc::new(publisher().await);

    let collaborators = Collaborators {
        stats_engine: Arc::new(DefaultStatsEngine),
        race_bonus: Arc::new(DefaultRaceBonus),
        coins: client.clone(),
        season: client.clone(),
        quests: publisher.clone(),
        leagues: publisher.clone(),
        feed: publisher.clone(),
        cache: publisher.clone()
    };

    let processor = WeeklyProcessor::new(client, collaborators, args.processor_config());
    let result = processor.run(args.as_of.unwrap_or_else(Utc::now)).await;
    drop(processor);

    if let Ok(mut publisher) = Arc::try_unwrap(publisher) {
        if publisher.is_connected() {
            if let Err(e) = publisher.close().await {
                warn!("Failed to close RabbitMQ connection: {}", e);
            }
        }
    }

    match result {
        Ok(summary) => {
            match serde_json::to_string_pretty(&summary) {
                Ok(json) => println!("{}", json),
                Err(e) => warn!("Failed to serialize run summary: {}", e)
            }
            info!("Processing complete");
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!("Weekly run failed: {}", e);
            ExitCode::FAILURE
        }
    }
}

/// Builds the message publisher. Messaging problems never stop the run; messages
/// sent through an unconnected publisher are counted as failed side effects.
async fn publisher() -> RabbitMqPublisher {
    let config = match RabbitMqConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            warn!("Invalid RabbitMQ configuration, messaging disabled: {}", e);
            RabbitMqConfig::default()
        }
    };

    if !config.enabled {
        info!("RabbitMQ messaging disabled");
        return RabbitMqPublisher::from_config(&config);
    }

    match RabbitMqPublisher::connect_from_config(&config).await {
        Ok(publisher) => publisher,
        Err(e) => {
            warn!("Failed to connect to RabbitMQ: {}", e);
            RabbitMqPublisher::from_config(&config)
        }
    }
}
