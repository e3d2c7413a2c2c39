use clap::Parser;
use infer_base::{Tensor, log};
use infer_client::validate::{validate_output_approx, validate_output_exact};
use infer_client::{Client, ClientConfig, ClientError, InferRequest, Protocol, Tolerance, Validation};
use rand::Rng;
use std::process::ExitCode;

const IDENTITY_MODEL: &str = "identity_model";
const PYTORCH_MODEL: &str = "pytorch_model";
const IDENTITY_LEN: usize = 16;
const REQUEST_PARALLELISM: usize = 4;

// Scores of `pytorch_model` for an all-ones 28x28 image.
const PYTORCH_EXPECTED: [f32; 10] = [
    -2.23593, -2.4019134, -2.2534406, -2.234721, -2.4211829, -2.2918148, -2.306964, -2.3553405,
    -2.3035986, -2.241666,
];

#[derive(Parser, Debug)]
#[command(name = "identity-check", version, about = "Check a running inference server")]
struct Cli {
    /// Inference server URL [default: localhost:8000 for http, localhost:8001 for grpc]
    #[arg(short, long)]
    url: Option<String>,

    /// Protocol used to talk to the server ("http" or "grpc")
    #[arg(short = 'i', long, default_value = "http")]
    protocol: String,

    /// Enable verbose output
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<ExitCode, Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    infer_base::init_console_logger(cli.verbose);

    let protocol = match cli.protocol.parse::<Protocol>() {
        Ok(protocol) => protocol,
        Err(ClientError::Config(message)) => {
            log::error!("{}", message);
            return Ok(ExitCode::FAILURE);
        }
        Err(err) => return Err(err.into()),
    };
    let url = cli.url.unwrap_or_else(|| protocol.default_url().to_string());
    let config = ClientConfig::new(url, protocol).with_verbose(cli.verbose);
    log::info!("checking {} over {}", config.url(), protocol);

    if !identity_sync(&config).await? {
        return Ok(ExitCode::FAILURE);
    }
    if !identity_async(&config).await? {
        return Ok(ExitCode::FAILURE);
    }
    if !pytorch_ones(&config).await? {
        return Ok(ExitCode::FAILURE);
    }

    log::info!("all checks passed");
    Ok(ExitCode::SUCCESS)
}

fn random_input() -> Vec<u32> {
    let mut rng = rand::thread_rng();
    (0..IDENTITY_LEN).map(|_| rng.gen_range(0..16384)).collect()
}

fn identity_request(values: &[u32]) -> Result<InferRequest, ClientError> {
    let input = Tensor::from_slice("IN", vec![values.len()], values)?;
    Ok(InferRequest::new(IDENTITY_MODEL)
        .with_input(input)
        .with_output("OUT"))
}

fn check(validation: &Validation) -> bool {
    if validation.passed() {
        log::info!("{}", validation);
    } else {
        log::error!("{}", validation);
    }
    validation.passed()
}

// One identity call, no concurrency.
async fn identity_sync(config: &ClientConfig) -> Result<bool, ClientError> {
    let client = Client::new(config.clone())?;
    let values = random_input();
    let result = client.infer(&identity_request(&values)?).await?;
    client.close().await;

    let expected = Tensor::from_slice("OUT", vec![IDENTITY_LEN], &values)?;
    Ok(check(&validate_output_exact(&result, "OUT", &expected)))
}

// Identity calls in flight together; each result must match its own input.
async fn identity_async(config: &ClientConfig) -> Result<bool, ClientError> {
    let client = Client::new(config.clone().with_max_concurrency(REQUEST_PARALLELISM))?;

    let mut inputs = Vec::with_capacity(REQUEST_PARALLELISM);
    let mut calls = Vec::with_capacity(REQUEST_PARALLELISM);
    for _ in 0..REQUEST_PARALLELISM {
        let values = random_input();
        calls.push(client.async_infer(identity_request(&values)?));
        inputs.push(values);
    }

    let mut passed = true;
    for (mut call, values) in calls.into_iter().zip(inputs) {
        let result = call.wait().await?;
        log::info!("{}", result);
        let expected = Tensor::from_slice("OUT", vec![IDENTITY_LEN], &values)?;
        passed &= check(&validate_output_exact(&result, "OUT", &expected));
    }
    client.close().await;
    Ok(passed)
}

async fn pytorch_ones(config: &ClientConfig) -> Result<bool, ClientError> {
    let client = Client::new(config.clone())?;
    let input = Tensor::from_slice("IN", vec![1, 1, 28, 28], &[1.0f32; 28 * 28])?;
    let request = InferRequest::new(PYTORCH_MODEL)
        .with_input(input)
        .with_output("OUT");
    let result = client.infer(&request).await?;
    client.close().await;

    let expected = Tensor::from_slice("OUT", vec![1, PYTORCH_EXPECTED.len()], &PYTORCH_EXPECTED)?;
    Ok(check(&validate_output_approx(
        &result,
        "OUT",
        &expected,
        Tolerance::default(),
    )))
}
