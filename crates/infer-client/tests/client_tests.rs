mod support;

use infer_base::{DType, Tensor};
use infer_client::validate::{validate_exact, validate_output_exact};
use infer_client::{
    Client, ClientConfig, ClientError, InferRequest, Mismatch, Protocol, RequestedOutput,
};
use infer_com::ComError;
use rand::Rng;
use std::time::Duration;
use support::MockServer;

const PROTOCOLS: [Protocol; 2] = [Protocol::Http, Protocol::Stream];

fn client(server: &MockServer, protocol: Protocol, max_concurrency: usize) -> Client {
    let config = ClientConfig::new(server.addr.clone(), protocol)
        .with_max_concurrency(max_concurrency)
        .with_verbose(true);
    Client::new(config).expect("client setup failed")
}

fn identity_request(values: &[u32]) -> InferRequest {
    let input = Tensor::from_slice("IN", vec![values.len()], values).unwrap();
    InferRequest::new("identity_model")
        .with_input(input)
        .with_output("OUT")
}

fn random_values(len: usize) -> Vec<u32> {
    let mut rng = rand::thread_rng();
    (0..len).map(|_| rng.r#gen::<u32>()).collect()
}

#[tokio::test]
async fn test_sync_identity() {
    for protocol in PROTOCOLS {
        let server = support::start(protocol, false).await;
        let client = client(&server, protocol, 1);

        let values: Vec<u32> = (0..16).collect();
        let result = client.infer(&identity_request(&values)).await.unwrap();

        assert_eq!(result.model_name(), "identity_model");
        assert_eq!(result.as_vec::<u32>("OUT").unwrap(), values);
        let expected = Tensor::from_slice("OUT", vec![16], &values).unwrap();
        let validation = validate_output_exact(&result, "OUT", &expected);
        assert!(validation.passed(), "{protocol}: {validation}");
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_async_identity() {
    for protocol in PROTOCOLS {
        let server = support::start(protocol, false).await;
        let client = client(&server, protocol, 4);

        let inputs: Vec<Vec<u32>> = (0..4).map(|_| random_values(16)).collect();
        let mut calls: Vec<_> = inputs
            .iter()
            .map(|values| client.async_infer(identity_request(values)))
            .collect();

        for (call, values) in calls.iter_mut().zip(&inputs) {
            let result = tokio::time::timeout(Duration::from_secs(5), call.wait())
                .await
                .expect("call did not complete")
                .unwrap();
            assert_eq!(&result.as_vec::<u32>("OUT").unwrap(), values);
        }
        assert!(client.pool().peak_in_flight() <= 4);
    }
}

#[tokio::test]
async fn test_request_id_and_version_echoed() {
    for protocol in PROTOCOLS {
        let server = support::start(protocol, false).await;
        let client = client(&server, protocol, 1);

        let request = identity_request(&[5, 6]).with_id("req-42").with_version("3");
        let result = client.infer(&request).await.unwrap();
        assert_eq!(result.id(), Some("req-42"));
        assert_eq!(result.model_version(), Some("3"));
    }
}

#[tokio::test]
async fn test_missing_output_is_reported() {
    for protocol in PROTOCOLS {
        let server = support::start(protocol, false).await;
        let client = client(&server, protocol, 1);

        let input = Tensor::from_slice("IN", vec![2], &[1u32, 2]).unwrap();
        let request = InferRequest::new("identity_model")
            .with_input(input)
            .with_output("NOT_THERE");
        let result = client.infer(&request).await.unwrap();

        match result.output("NOT_THERE") {
            Err(ClientError::MissingOutput(name)) => assert_eq!(name, "NOT_THERE"),
            other => panic!("Expected MissingOutput, got {:?}", other),
        }

        let expected = Tensor::from_slice("NOT_THERE", vec![2], &[0u32, 0]).unwrap();
        let validation = validate_output_exact(&result, "NOT_THERE", &expected);
        assert!(!validation.passed());
        assert_eq!(
            validation.mismatch(),
            Some(&Mismatch::MissingOutput("NOT_THERE".to_string()))
        );
    }
}

#[tokio::test]
async fn test_model_without_outputs() {
    for protocol in PROTOCOLS {
        let server = support::start(protocol, false).await;
        let client = client(&server, protocol, 1);

        let input = Tensor::from_slice("IN", vec![1], &[1u32]).unwrap();
        let result = client
            .infer(&InferRequest::new("empty_model").with_input(input))
            .await
            .unwrap();
        assert!(result.outputs().is_empty());
        assert!(matches!(result.as_vec::<u32>("OUT"), Err(ClientError::MissingOutput(_))));
    }
}

#[tokio::test]
async fn test_server_error_surfaces() {
    for protocol in PROTOCOLS {
        let server = support::start(protocol, false).await;
        let client = client(&server, protocol, 1);

        let input = Tensor::from_slice("IN", vec![1], &[1u32]).unwrap();
        let request = InferRequest::new("no_such_model").with_input(input);
        match client.infer(&request).await {
            Err(ClientError::Server(message)) => {
                assert!(message.contains("unknown model"), "{protocol}: {message}")
            }
            other => panic!("Expected Server error, got {:?}", other),
        }

        // A rejected request leaves the connection usable.
        assert!(client.infer(&identity_request(&[1])).await.is_ok());
        assert_eq!(client.pool().opened_count(), 1);
    }
}

#[tokio::test]
async fn test_async_errors_are_deferred_to_wait() {
    for protocol in PROTOCOLS {
        let server = support::start(protocol, false).await;
        let client = client(&server, protocol, 1);

        let mut call = client.async_infer(InferRequest::new("no_such_model"));
        assert!(matches!(call.wait().await, Err(ClientError::Server(_))));

        let mut call = client.async_infer(InferRequest::new(""));
        assert!(matches!(call.wait().await, Err(ClientError::InvalidRequest(_))));
    }
}

#[tokio::test]
async fn test_invalid_request_rejected_before_sending() {
    let server = support::start(Protocol::Http, false).await;
    let client = client(&server, Protocol::Http, 1);

    let input = Tensor::from_slice("IN", vec![1], &[1u32]).unwrap();
    let request = InferRequest::new("identity_model")
        .with_input(input.clone())
        .with_input(input);
    assert!(matches!(
        client.infer(&request).await,
        Err(ClientError::InvalidRequest(_))
    ));
    assert_eq!(server.stats.connections(), 0);
}

#[tokio::test]
async fn test_second_wait_is_already_consumed() {
    for protocol in PROTOCOLS {
        let server = support::start(protocol, false).await;
        let client = client(&server, protocol, 1);

        let mut call = client.async_infer(identity_request(&[1, 2, 3]));
        assert!(call.wait().await.is_ok());
        assert!(call.is_finished());
        assert!(matches!(call.wait().await, Err(ClientError::AlreadyConsumed)));
    }
}

#[tokio::test]
async fn test_cancel_before_completion() {
    for protocol in PROTOCOLS {
        let server = support::start(protocol, false).await;
        let client = client(&server, protocol, 1);

        let input = Tensor::from_slice("IN", vec![4], &[1u32, 2, 3, 4]).unwrap();
        let mut call = client.async_infer(InferRequest::new("slow_model").with_input(input));
        tokio::time::sleep(Duration::from_millis(20)).await;
        call.cancel();

        assert!(call.is_cancelled());
        assert!(matches!(call.wait().await, Err(ClientError::Cancelled)));
        assert!(matches!(call.wait().await, Err(ClientError::Cancelled)));

        // The cancelled call's connection is closed, not reused.
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(client.in_flight(), 0);
        assert_eq!(client.pool().idle_count(), 0);
        assert!(client.infer(&identity_request(&[9])).await.is_ok());
    }
}

#[tokio::test]
async fn test_cancel_after_completion_is_noop() {
    let server = support::start(Protocol::Stream, false).await;
    let client = client(&server, Protocol::Stream, 1);

    let mut call = client.async_infer(identity_request(&[7, 8]));
    tokio::time::timeout(Duration::from_secs(5), async {
        while !call.is_finished() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("call did not finish");

    call.cancel();
    assert!(!call.is_cancelled());
    let result = call.wait().await.unwrap();
    assert_eq!(result.as_vec::<u32>("OUT").unwrap(), vec![7, 8]);
}

#[tokio::test]
async fn test_request_timeout_closes_connection() {
    for protocol in PROTOCOLS {
        let server = support::start(protocol, false).await;
        let client = client(&server, protocol, 1);

        let input = Tensor::from_slice("IN", vec![1], &[1u32]).unwrap();
        let request = InferRequest::new("slow_model")
            .with_input(input)
            .with_timeout(Duration::from_millis(50));
        assert!(matches!(client.infer(&request).await, Err(ClientError::Timeout)));
        assert_eq!(client.in_flight(), 0);
        assert_eq!(client.pool().idle_count(), 0);

        assert!(client.infer(&identity_request(&[3])).await.is_ok());
        assert_eq!(client.pool().opened_count(), 2);
    }
}

#[tokio::test]
async fn test_client_default_timeout() {
    let server = support::start(Protocol::Http, false).await;
    let config = ClientConfig::new(server.addr.clone(), Protocol::Http)
        .with_timeout(Some(Duration::from_millis(50)));
    let client = Client::new(config).unwrap();

    let input = Tensor::from_slice("IN", vec![1], &[1u32]).unwrap();
    let request = InferRequest::new("slow_model").with_input(input);
    assert!(matches!(client.infer(&request).await, Err(ClientError::Timeout)));

    // A per-request deadline wins over the client default.
    let request = request.with_timeout(Duration::from_secs(5));
    assert!(client.infer(&request).await.is_ok());
}

#[tokio::test]
async fn test_wait_timeout_cancels_call() {
    let server = support::start(Protocol::Stream, false).await;
    let client = client(&server, Protocol::Stream, 1);

    let input = Tensor::from_slice("IN", vec![1], &[1u32]).unwrap();
    let mut call = client.async_infer(InferRequest::new("slow_model").with_input(input));

    assert!(matches!(
        call.wait_timeout(Duration::from_millis(30)).await,
        Err(ClientError::Timeout)
    ));
    assert!(matches!(call.wait().await, Err(ClientError::Cancelled)));
}

#[tokio::test]
async fn test_stale_connection_replaced() {
    for protocol in PROTOCOLS {
        let server = support::start(protocol, true).await;
        let client = client(&server, protocol, 1);

        assert!(client.infer(&identity_request(&[1])).await.is_ok());
        // The server hung up on the idle connection; the client must not notice.
        let result = client.infer(&identity_request(&[2])).await.unwrap();
        assert_eq!(result.as_vec::<u32>("OUT").unwrap(), vec![2]);

        assert_eq!(client.pool().opened_count(), 2);
        assert_eq!(server.stats.connections(), 2);
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrency_ceiling() {
    for protocol in PROTOCOLS {
        let server = support::start(protocol, false).await;
        let client = client(&server, protocol, 2);

        let mut calls: Vec<_> = (0..6u32)
            .map(|i| {
                let input = Tensor::from_slice("IN", vec![1], &[i]).unwrap();
                client.async_infer(InferRequest::new("slow_model").with_input(input))
            })
            .collect();

        for (i, call) in calls.iter_mut().enumerate() {
            let result = call.wait().await.unwrap();
            assert_eq!(result.as_vec::<u32>("OUT").unwrap(), vec![i as u32]);
        }

        assert!(client.pool().peak_in_flight() <= 2);
        assert!(server.stats.peak_active() <= 2);
        assert!(server.stats.connections() <= 2);
        assert_eq!(server.stats.requests(), 6);
    }
}

#[tokio::test]
async fn test_close_drains_in_flight_calls() {
    for protocol in PROTOCOLS {
        let server = support::start(protocol, false).await;
        let client = client(&server, protocol, 2);

        let input = Tensor::from_slice("IN", vec![1], &[5u32]).unwrap();
        let mut call = client.async_infer(InferRequest::new("slow_model").with_input(input));
        tokio::time::sleep(Duration::from_millis(20)).await;

        tokio::time::timeout(Duration::from_secs(5), client.close())
            .await
            .expect("close did not finish");
        assert!(call.is_finished());
        assert!(call.wait().await.is_ok());

        match client.infer(&identity_request(&[1])).await {
            Err(ClientError::Transport(ComError::PoolClosed)) => {}
            other => panic!("Expected PoolClosed, got {:?}", other),
        }
    }
}

#[tokio::test]
async fn test_server_hangup_is_transport_error() {
    for protocol in PROTOCOLS {
        let server = support::start(protocol, false).await;
        let client = client(&server, protocol, 1);

        let input = Tensor::from_slice("IN", vec![1], &[1u32]).unwrap();
        let request = InferRequest::new("drop_model").with_input(input);
        match client.infer(&request).await {
            Err(err) => assert!(err.is_transport(), "{protocol}: {err}"),
            Ok(result) => panic!("Expected transport error, got {result}"),
        }
    }
}

#[tokio::test]
async fn test_unreachable_server() {
    let addr = {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.expect("bind failed");
        listener.local_addr().unwrap().to_string()
    };
    let client = Client::new(ClientConfig::new(addr, Protocol::Http)).unwrap();

    let mut call = client.async_infer(identity_request(&[1]));
    assert!(matches!(call.wait().await, Err(ClientError::Transport(_))));
    assert_eq!(client.in_flight(), 0);
}

#[tokio::test]
async fn test_http_binary_data_preserves_bits() {
    let server = support::start(Protocol::Http, false).await;
    let config = ClientConfig::new(format!("http://{}", server.addr), Protocol::Http)
        .with_binary_data(true);
    let client = Client::new(config).unwrap();

    let values = [1.5f32, -0.0, f32::NAN, f32::INFINITY, f32::MIN_POSITIVE];
    let input = Tensor::from_slice("IN", vec![5], &values).unwrap();
    let request = InferRequest::new("identity_model")
        .with_input(input.clone())
        .with_output("OUT");
    let result = client.infer(&request).await.unwrap();

    let validation = validate_exact(result.output("OUT").unwrap(), &input.renamed("OUT"));
    assert!(validation.passed(), "{validation}");
}

#[tokio::test]
async fn test_http_non_finite_and_half_inputs_use_binary() {
    let server = support::start(Protocol::Http, false).await;
    let client = client(&server, Protocol::Http, 1);

    // 1.0, -2.0 and +inf as IEEE half floats.
    let half = Tensor::new(
        "IN_HALF",
        DType::F16,
        vec![3],
        [0x3c00u16, 0xc000, 0x7c00]
            .iter()
            .flat_map(|v| v.to_le_bytes())
            .collect(),
    )
    .unwrap();
    let nan = Tensor::from_slice("IN_NAN", vec![2], &[f64::NAN, 2.0]).unwrap();
    let request = InferRequest::new("identity_model")
        .with_input(half.clone())
        .with_input(nan.clone())
        .with_requested_output(RequestedOutput::new("OUT_HALF").with_binary_data(true))
        .with_requested_output(RequestedOutput::new("OUT_NAN").with_binary_data(true));
    let result = client.infer(&request).await.unwrap();

    assert_eq!(result.output("OUT_HALF").unwrap().data(), half.data());
    assert_eq!(result.output("OUT_NAN").unwrap().data(), nan.data());
}

#[tokio::test]
async fn test_unparseable_reply_on_reused_connection_is_not_resent() {
    for protocol in PROTOCOLS {
        let server = support::start(protocol, false).await;
        let client = client(&server, protocol, 1);

        client.infer(&identity_request(&[1, 2])).await.unwrap();
        let request = InferRequest::new("garbled_model").with_input(
            Tensor::from_slice("IN", vec![1], &[3u32]).unwrap(),
        );
        match client.infer(&request).await {
            Err(ClientError::Transport(err)) => {
                assert!(matches!(err, ComError::Protocol(_)), "{protocol}: {err}");
                assert!(!err.is_connection_failure());
            }
            Err(ClientError::Codec(_)) => assert_eq!(protocol, Protocol::Stream),
            other => panic!("Expected a parse failure, got {:?}", other),
        }

        assert_eq!(server.stats.requests(), 2, "{protocol}");
        assert_eq!(server.stats.connections(), 1, "{protocol}");
    }
}
