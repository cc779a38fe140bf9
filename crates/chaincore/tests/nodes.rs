use chaincore::{
    ChainError, ChainNode, Envelope, Generate, GeneratorNode, NodeFailure, ToolError, Transform,
    TransformNode, INPUT_SOURCE,
};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;

const RECV_BUDGET: Duration = Duration::from_secs(2);

struct Doubler;

impl Transform for Doubler {
    type Input = i64;
    type Output = i64;

    fn name(&self) -> &str {
        "doubler"
    }

    fn apply(&self, input: i64) -> Result<i64, ToolError> {
        Ok(input * 2)
    }
}

struct Rejector;

impl Transform for Rejector {
    type Input = i64;
    type Output = i64;

    fn name(&self) -> &str {
        "rejector"
    }

    fn apply(&self, _input: i64) -> Result<i64, ToolError> {
        Err(ToolError::new("nope"))
    }
}

struct Repeater;

impl Generate for Repeater {
    type Input = String;
    type Output = String;

    fn name(&self) -> &str {
        "repeater"
    }

    fn expand(&self, inputs: Vec<String>) -> Box<dyn Iterator<Item = String> + Send> {
        Box::new(inputs.into_iter())
    }
}

/// Start a node task and hand back its endpoints.
fn start(
    node: Arc<dyn ChainNode>,
    shutdown: &CancellationToken,
) -> (
    mpsc::Sender<Envelope>,
    mpsc::Receiver<Envelope>,
    mpsc::Receiver<NodeFailure>,
) {
    let input = node.input();
    let output = node.take_output().expect("output already taken");
    let errors = node.take_errors().expect("errors already taken");
    let token = shutdown.clone();
    tokio::spawn(async move { node.run(token).await });
    (input, output, errors)
}

async fn recv_output(output: &mut mpsc::Receiver<Envelope>) -> Envelope {
    timeout(RECV_BUDGET, output.recv())
        .await
        .expect("timed out waiting for output")
        .expect("output queue closed")
}

async fn recv_failure(errors: &mut mpsc::Receiver<NodeFailure>) -> NodeFailure {
    timeout(RECV_BUDGET, errors.recv())
        .await
        .expect("timed out waiting for failure")
        .expect("error queue closed")
}

#[tokio::test]
async fn transform_emits_one_terminal_envelope_per_delivery() {
    let shutdown = CancellationToken::new();
    let (input, mut output, _errors) = start(Arc::new(TransformNode::new(Doubler)), &shutdown);

    for n in [1i64, 2, 3] {
        input
            .send(Envelope::encode(INPUT_SOURCE, true, &n).unwrap())
            .await
            .unwrap();
    }
    for n in [1i64, 2, 3] {
        let out = recv_output(&mut output).await;
        assert_eq!(out.producer, "doubler");
        assert!(out.terminal);
        assert_eq!(out.decode::<i64>().unwrap(), n * 2);
    }

    shutdown.cancel();
}

#[tokio::test]
async fn transform_failure_goes_to_error_queue_and_node_continues() {
    let shutdown = CancellationToken::new();
    let (input, mut output, mut errors) = start(Arc::new(TransformNode::new(Doubler)), &shutdown);

    // Wrong payload type: locally fatal to this delivery only.
    input
        .send(Envelope::encode(INPUT_SOURCE, true, &"oops".to_string()).unwrap())
        .await
        .unwrap();
    let failure = recv_failure(&mut errors).await;
    assert_eq!(failure.node, "doubler");
    assert!(matches!(failure.error, ChainError::Decode(_)));

    // The node keeps processing subsequent deliveries.
    input
        .send(Envelope::encode(INPUT_SOURCE, true, &21i64).unwrap())
        .await
        .unwrap();
    let out = recv_output(&mut output).await;
    assert_eq!(out.decode::<i64>().unwrap(), 42);

    shutdown.cancel();
}

#[tokio::test]
async fn tool_failure_is_tagged_as_tool_error() {
    let shutdown = CancellationToken::new();
    let (input, _output, mut errors) = start(Arc::new(TransformNode::new(Rejector)), &shutdown);

    input
        .send(Envelope::encode(INPUT_SOURCE, true, &1i64).unwrap())
        .await
        .unwrap();
    let failure = recv_failure(&mut errors).await;
    assert!(matches!(failure.error, ChainError::Tool(_)));

    shutdown.cancel();
}

#[tokio::test]
async fn generator_emits_k_envelopes_with_only_the_last_terminal() {
    let shutdown = CancellationToken::new();
    let (input, mut output, _errors) = start(Arc::new(GeneratorNode::new(Repeater)), &shutdown);

    let batch = vec!["a".to_string(), "b".to_string(), "c".to_string()];
    input
        .send(Envelope::encode(INPUT_SOURCE, true, &batch).unwrap())
        .await
        .unwrap();

    for (i, expected) in batch.iter().enumerate() {
        let out = recv_output(&mut output).await;
        assert_eq!(out.producer, "repeater");
        assert_eq!(out.decode::<String>().unwrap(), *expected);
        assert_eq!(out.terminal, i == batch.len() - 1);
    }

    shutdown.cancel();
}

#[tokio::test]
async fn empty_generator_input_still_emits_one_terminal_marker() {
    let shutdown = CancellationToken::new();
    let (input, mut output, _errors) = start(Arc::new(GeneratorNode::new(Repeater)), &shutdown);

    input
        .send(Envelope::encode(INPUT_SOURCE, true, &Vec::<String>::new()).unwrap())
        .await
        .unwrap();

    let out = recv_output(&mut output).await;
    assert!(out.is_marker());
    assert!(out.terminal);
    assert_eq!(out.producer, "repeater");

    shutdown.cancel();
}

#[derive(Clone)]
struct Flaky {
    ok: bool,
    n: i64,
}

impl Serialize for Flaky {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        if self.ok {
            serializer.serialize_i64(self.n)
        } else {
            Err(serde::ser::Error::custom("unencodable element"))
        }
    }
}

struct FlakySource;

impl Generate for FlakySource {
    type Input = i64;
    type Output = Flaky;

    fn name(&self) -> &str {
        "flaky-source"
    }

    fn expand(&self, _inputs: Vec<i64>) -> Box<dyn Iterator<Item = Flaky> + Send> {
        Box::new(
            vec![
                Flaky { ok: true, n: 1 },
                Flaky { ok: false, n: 2 },
                Flaky { ok: true, n: 3 },
            ]
            .into_iter(),
        )
    }
}

#[tokio::test]
async fn generator_encode_failure_aborts_the_rest_of_the_sequence() {
    let shutdown = CancellationToken::new();
    let (input, mut output, mut errors) =
        start(Arc::new(GeneratorNode::new(FlakySource)), &shutdown);

    input
        .send(Envelope::encode(INPUT_SOURCE, true, &vec![0i64]).unwrap())
        .await
        .unwrap();

    // The first element made it out, non-terminal.
    let out = recv_output(&mut output).await;
    assert_eq!(out.producer, "flaky-source");
    assert!(!out.terminal);
    assert!(!out.is_marker());

    // The second failed to encode; production stops there.
    let failure = recv_failure(&mut errors).await;
    assert!(matches!(failure.error, ChainError::Encode(_)));
    assert!(output.try_recv().is_err());

    shutdown.cancel();
}
