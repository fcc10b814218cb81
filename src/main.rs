use std::env;
use std::path::PathBuf;
use std::str::FromStr;

use burn::backend::{Autodiff, NdArray};
use burn::config::Config;
use dotenv::dotenv;
use marl_ppo::{
    CsvLogger, MetricsSink, PPO, PPOConfig, RolloutEvaluator, ScheduleConfig, SignMatchingEnv,
    TracingSink, TrainingLoop,
};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

type Backend = Autodiff<NdArray<f32>>;

const EVALUATION_STEPS: usize = 100;

fn get_env_var<T: FromStr>(key: &str) -> Option<T> {
    env::var(key).ok().and_then(|val| val.parse::<T>().ok())
}

fn init_logging() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("marl_ppo=debug,info"));

    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_target(false)
        .with_ansi(true)
        .finish();

    tracing::subscriber::set_global_default(subscriber).expect("setting default subscriber failed");
}

fn schedule_from_env() -> ScheduleConfig {
    schedule_from(|key| env::var(key).ok())
}

fn parse_var<T: FromStr>(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Option<T> {
    lookup(key).and_then(|val| val.parse::<T>().ok())
}

/// Scheduling surface from `PPO_*` variables; anything unset or unparsable
/// keeps its `ScheduleConfig::default()` value
fn schedule_from(lookup: impl Fn(&str) -> Option<String>) -> ScheduleConfig {
    let defaults = ScheduleConfig::default();

    ScheduleConfig {
        nb_time_steps: parse_var(&lookup, "PPO_TIME_STEPS").unwrap_or(defaults.nb_time_steps),
        nb_tr_episodes: parse_var(&lookup, "PPO_TR_EPISODES").unwrap_or(defaults.nb_tr_episodes),
        nb_tr_epochs: parse_var(&lookup, "PPO_TR_EPOCHS").unwrap_or(defaults.nb_tr_epochs),
        nb_tr_logs: parse_var(&lookup, "PPO_TR_LOGS").unwrap_or(defaults.nb_tr_logs),
        nb_test_logs: parse_var(&lookup, "PPO_TEST_LOGS").unwrap_or(defaults.nb_test_logs),
        nb_inter_saving_actor: parse_var(&lookup, "PPO_INTER_SAVING_ACTOR")
            .unwrap_or(defaults.nb_inter_saving_actor),
        save_actor_name: lookup("PPO_SAVE_ACTOR_NAME").or(defaults.save_actor_name),
        save_dir: lookup("PPO_SAVE_DIR")
            .map(PathBuf::from)
            .unwrap_or(defaults.save_dir),
        env_seed: parse_var(&lookup, "PPO_ENV_SEED").unwrap_or(defaults.env_seed),
        evaluate: parse_var(&lookup, "PPO_EVALUATE").unwrap_or(defaults.evaluate),
        log_metrics: defaults.log_metrics,
    }
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenv().ok();
    init_logging();

    let schedule = schedule_from_env();
    let nb_agents: usize = get_env_var("PPO_NB_AGENTS").unwrap_or(4);

    let config = match env::var("PPO_CONFIG") {
        Ok(path) => PPOConfig::load(&path)
            .map_err(|e| format!("Failed to load PPO config from {path}: {e:?}"))?,
        Err(_) => PPOConfig::default(),
    };
    tracing::info!("PPO config: {}", config);

    let agent = PPO::<Backend>::new(
        Default::default(),
        config,
        SignMatchingEnv::NUM_STATE,
        SignMatchingEnv::NUM_ACTION,
        nb_agents,
        schedule.env_seed,
    )?;
    let env = SignMatchingEnv::new(nb_agents, schedule.env_seed);
    let evaluator = RolloutEvaluator::new(
        SignMatchingEnv::new(nb_agents, schedule.env_seed.wrapping_add(1)),
        EVALUATION_STEPS,
    );

    let sink: Box<dyn MetricsSink> = match env::var("PPO_LOG_DIR") {
        Ok(dir) => Box::new(CsvLogger::new(dir)?),
        Err(_) => Box::new(TracingSink),
    };

    let mut training =
        TrainingLoop::new(agent, env, schedule, sink).with_evaluator(Box::new(evaluator));
    let summary = training.run()?;

    tracing::info!(
        "Finished {} time steps: {} updates, {} training steps",
        summary.time_steps,
        summary.updates,
        summary.training_step
    );
    if let Some(path) = summary.final_actor {
        tracing::info!("Final actor: {}", path.display());
    }

    Ok(())
}
