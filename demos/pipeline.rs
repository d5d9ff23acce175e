use stream_tools::prelude::*;
use tracing_subscriber::EnvFilter;

/// Apply `op` to every `i32` read from `input`.
fn stage(op: fn(i32) -> i32) -> impl Fn(Consumer, Producer) + Send + Sync + 'static {
    move |mut input: Consumer, mut output: Producer| loop {
        match input.extract_scalar::<i32>() {
            Ok(val) => {
                if output.write_scalar(op(val)).is_err() {
                    return;
                }
            }
            Err(BufferError::Overflow { .. }) => {
                output.close().unwrap_or_default();
                return;
            }
            Err(_) => {
                output.fail().unwrap_or_default();
                return;
            }
        }
    }
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let mut pipeline = Pipeline::named("math");
    pipeline
        .add_stage(stage(|v| v * 2))
        .add_stage(stage(|v| v + 5))
        .add_stage(stage(|v| v - 5))
        .add_stage(stage(|v| v / 2));

    let mut input = ByteStore::new();
    (1..=24).for_each(|v: i32| input.append_scalar(v));

    let (mut result, handle) = pipeline.process(input).unwrap();

    let mut output = Vec::new();
    while let Ok(val) = result.extract_scalar::<i32>() {
        output.push(val);
    }

    println!("Output: {:?}", output);
    assert_eq!(output, (1..=24).collect::<Vec<i32>>());

    for report in handle.wait() {
        println!(
            "Stage {} ({}): {}, panicked: {}",
            report.index, report.name, report.status, report.panicked
        );
    }
}
