use std::process::ExitCode;

use otter_app::{AppError, CliArgs, USAGE, build_prompt_request, config::AppConfig, run_prompt};
use otter_clients_openai::DeepSeekClient;
use otter_observability::init_tracing;
use tracing::error;

#[tokio::main]
async fn main() -> ExitCode {
    let _ = dotenvy::dotenv();
    init_tracing("otter-app");

    let config = AppConfig::from_env().expect("configuration must be valid");
    let Some(args) = CliArgs::parse(std::env::args().skip(1), config.stream) else {
        eprintln!("{USAGE}");
        return ExitCode::from(2);
    };
    let model = DeepSeekClient::from_config(&config.deepseek).expect("model client must build");
    let request = build_prompt_request(&args.prompt, config.system_instruction.as_deref());

    let mut stdout = std::io::stdout().lock();
    match run_prompt(&model, request, args.stream, &mut stdout).await {
        Ok(response) => {
            if let Some(usage) = response.usage_metadata {
                eprintln!(
                    "usage: prompt={} completion={} total={} cached={}",
                    usage.prompt_tokens,
                    usage.completion_tokens,
                    usage.total_tokens,
                    usage.cached_tokens.unwrap_or(0)
                );
            }
            ExitCode::SUCCESS
        }
        Err(err) => {
            if let AppError::Model(model_error) = &err {
                error!(event = "app.prompt.failed", error = %model_error);
            }
            eprintln!("error: {err}");
            ExitCode::FAILURE
        }
    }
}
