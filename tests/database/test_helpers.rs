use chrono::{DateTime, Utc};
use lazy_static::lazy_static;
use std::sync::Arc;
use testcontainers::{clients::Cli, Container};
use testcontainers_modules::postgres::Postgres;
use tokio_postgres::{Client, NoTls};
use velo_processor::{
    database::db_structs::CachedActivity,
    utils::test_utils::{generate_activities, generate_activity, test_as_of}
};

pub struct TestDatabase {
    pub connection_string: String,
    _container: Container<'static, Postgres>
}

impl TestDatabase {
    pub async fn new() -> Result<Self, Box<dyn std::error::Error>> {
        lazy_static! {
            static ref DOCKER: Arc<Cli> = Arc::new(Cli::default());
        }

        let container = DOCKER.run(Postgres::default());
        let port = container.get_host_port_ipv4(5432);

        let connection_string = format!(
            "host=localhost port={} user=postgres password=postgres dbname=postgres",
            port
        );

        let (client, connection) = tokio_postgres::connect(&connection_string, NoTls).await?;
        tokio::spawn(async move {
            if let Err(e) = connection.await {
                eprintln!("Database connection error: {}", e);
            }
        });

        let schema = include_str!("schema.sql");
        client.batch_execute(schema).await?;

        Ok(TestDatabase {
            connection_string,
            _container: container
        })
    }

    pub async fn get_client(&self) -> Result<Client, Box<dyn std::error::Error>> {
        let (client, connection) = tokio_postgres::connect(&self.connection_string, NoTls).await?;

        tokio::spawn(async move {
            if let Err(e) = connection.await {
                eprintln!("Database connection error: {}", e);
            }
        });

        Ok(client)
    }

    /// Three riders: 1 rode five times this week, 2 rode once, 3 has been idle a week.
    /// Rider 2 also has three career podiums and an active sprint boost.
    pub async fn seed_test_data(&self) -> Result<(), Box<dyn std::error::Error>> {
        let client = self.get_client().await?;

        for (user_id, value, tier, streak) in [(1, 50, "silver", 5), (2, 60, "silver", 3), (3, 70, "platinum", -1)] {
            client
                .execute(
                    "INSERT INTO performance_profiles (user_id, pace, endurance, mountain, resistance, sprint, \
                     technique, ovr, tier, streak, prev_pace, prev_endurance, prev_mountain, prev_resistance, \
                     prev_sprint, prev_technique, prev_ovr, prev_tier) \
                     VALUES ($1, $2, $2, $2, $2, $2, $2, $2, $3, $4, $2, $2, $2, $2, $2, $2, $2, $3)",
                    &[&user_id, &value, &tier, &streak]
                )
                .await?;
        }

        let mut rides = generate_activities(1, 5, 1);
        rides.push(generate_activity(2, 30_000.0, 250.0));
        let mut walk = generate_activity(2, 5_000.0, 10.0);
        walk.activity_type = "Walk".to_string();
        rides.push(walk);
        insert_activities(&client, &rides).await?;

        let long_ago = test_as_of() - chrono::Duration::days(60);
        for position in [1, 2, 3] {
            insert_race(&client, 2, position, 40, long_ago).await?;
        }

        client
            .execute(
                "INSERT INTO stat_boosts (user_id, stat, amount, expires_at) VALUES \
                 (2, 'spr', 3, $1), (2, 'pac', 9, $2)",
                &[
                    &(test_as_of() + chrono::Duration::days(3)),
                    &(test_as_of() - chrono::Duration::days(1))
                ]
            )
            .await?;

        client
            .execute(
                "INSERT INTO leagues (id, name, duration_weeks, weeks_scored) VALUES \
                 (1, 'Autumn Classics', 4, 1), (2, 'Gran Fondo', 2, 1)",
                &[]
            )
            .await?;
        client
            .execute(
                "INSERT INTO league_members (league_id, user_id, transfers_remaining) VALUES \
                 (1, 1, 0), (1, 2, 0), (2, 3, 0)",
                &[]
            )
            .await?;

        Ok(())
    }
}

pub async fn insert_activities(client: &Client, activities: &[CachedActivity]) -> Result<(), tokio_postgres::Error> {
    for a in activities {
        client
            .execute(
                "INSERT INTO activities (user_id, distance, elevation_gain, avg_speed, max_speed, elapsed_time, \
                 start_date, type) VALUES ($1, $2, $3, $4, $5, $6, $7, $8)",
                &[
                    &a.user_id,
                    &a.distance,
                    &a.elevation_gain,
                    &a.avg_speed,
                    &a.max_speed,
                    &a.elapsed_time,
                    &a.start_date,
                    &a.activity_type
                ]
            )
            .await?;
    }

    Ok(())
}

pub async fn insert_race(
    client: &Client,
    user_id: i32,
    position: i32,
    field_size: i32,
    finished_at: DateTime<Utc>
) -> Result<(), tokio_postgres::Error> {
    client
        .execute(
            "INSERT INTO race_results (user_id, position, field_size, finished_at) VALUES ($1, $2, $3, $4)",
            &[&user_id, &position, &field_size, &finished_at]
        )
        .await?;

    Ok(())
}
