use darth_core::backends::{cpu::CpuTensor, Tensor};
use darth_core::module::{Activation, Module};
use darth_core::nn::activations::{ReLU, Sigmoid};
use darth_core::nn::linear::{Linear, Sequential};
use darth_core::nn::losses::{Loss, Mse};

use log::{LevelFilter, Log, Metadata, Record};
use ndarray::array;

struct StderrLogger;

impl Log for StderrLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= log::max_level()
    }

    fn log(&self, record: &Record) {
        if self.enabled(record.metadata()) {
            eprintln!("{:<5} {}", record.level(), record.args());
        }
    }

    fn flush(&self) {}
}

static LOGGER: StderrLogger = StderrLogger;

fn init_logging() {
    let level = std::env::var("DARTH_LOG")
        .ok()
        .and_then(|v| v.parse::<LevelFilter>().ok())
        .unwrap_or(LevelFilter::Warn);
    if log::set_logger(&LOGGER).is_ok() {
        log::set_max_level(level);
    }
}

fn main() -> darth_core::Result<()> {
    init_logging();

    let inputs = CpuTensor::new(
        array![[0.0f32, 0.0], [0.0, 1.0], [1.0, 0.0], [1.0, 1.0]].into_dyn(),
    );
    let targets = CpuTensor::new(array![[0.0f32], [1.0], [1.0], [0.0]].into_dyn());

    let mut model = Sequential::<f32, CpuTensor<f32>>::default()
        .with(Linear::with_lr(2, 8, 0.5, Activation::Factory(ReLU::factory()))?)
        .with(Linear::with_lr(8, 1, 0.5, Activation::Factory(Sigmoid::factory()))?);

    println!("{}", model.repr());

    let loss_fn = Mse;
    let epochs = 5000;

    println!("Training model...");
    for epoch in 0..epochs {
        let prediction = model.forward(&inputs)?;
        let loss = loss_fn.loss(&prediction, &targets)?;
        model.backward(&loss_fn.grad(&prediction, &targets)?)?;

        if epoch % 500 == 0 {
            println!("epoch {:>5}: loss {:.6}", epoch, loss);
        }
    }

    println!("Testing model...");
    let prediction = model.forward(&inputs)?;
    for (row, (input, output)) in inputs
        .get_data()
        .outer_iter()
        .zip(prediction.get_data().outer_iter())
        .enumerate()
    {
        println!(
            "{}: {} -> {:.3} (target {})",
            row,
            input,
            output[[0]],
            targets.get_data()[[row, 0]]
        );
    }
    println!("final loss {:.6}", loss_fn.loss(&prediction, &targets)?);

    Ok(())
}
