//! Core WASM benchmark wrapper and low-level utilities.

use hydrobench_core::benchmark::{evaluate_variant, Variant};
use hydrobench_core::config::BenchmarkConfig;
use hydrobench_core::elements::{Gr4jParameters, Gr4jUnit, ImplicitEuler, Pegasus};
use hydrobench_core::forcing::{Forcing, Gr4jForcing};
use hydrobench_core::loss::{flow_loss, loss_gradient};
use hydrobench_core::model::{Parameters, State};
use wasm_bindgen::prelude::*;

pub(crate) fn to_js(err: anyhow::Error) -> JsValue {
    JsValue::from_str(&format!("{err:#}"))
}

pub(crate) fn parse_variant(name: &str) -> Result<Variant, JsValue> {
    name.parse::<Variant>().map_err(to_js)
}

/// ExpHydro forcing plus run settings, driven from JavaScript.
#[wasm_bindgen]
pub struct WasmBenchmark {
    pub(crate) forcing: Forcing,
    pub(crate) config: BenchmarkConfig,
}

#[wasm_bindgen]
impl WasmBenchmark {
    /// Parses forcing CSV text, keeping at most `data_length` rows.
    #[wasm_bindgen(constructor)]
    pub fn new(csv: &str, data_length: Option<usize>) -> Result<WasmBenchmark, JsValue> {
        console_error_panic_hook::set_once();

        let forcing = Forcing::from_reader(csv.as_bytes(), data_length).map_err(to_js)?;
        Ok(WasmBenchmark {
            forcing,
            config: BenchmarkConfig::default(),
        })
    }

    pub fn len(&self) -> usize {
        self.forcing.len()
    }

    pub fn is_empty(&self) -> bool {
        self.forcing.is_empty()
    }

    /// Parameters in `Tmin, Tmax, Df, Smax, Qmax, f` order.
    pub fn set_parameters(&mut self, params: Vec<f64>) -> Result<(), JsValue> {
        let params = Parameters::from_slice(&params).map_err(to_js)?;
        params.validate().map_err(to_js)?;
        self.config.parameters = params;
        Ok(())
    }

    pub fn get_parameters(&self) -> Vec<f64> {
        self.config.parameters.to_array().to_vec()
    }

    pub fn set_initial_state(&mut self, snowpack: f64, soilwater: f64) {
        self.config.initial_state = State {
            snowpack,
            soilwater,
        };
    }

    pub fn set_tolerances(&mut self, rtol: f64, atol: f64) {
        let mut controller = self.config.controller.unwrap_or_default();
        controller.rtol = rtol;
        controller.atol = atol;
        self.config.controller = Some(controller);
    }

    /// Simulated daily flow for the named variant.
    pub fn simulate_flow(&self, variant: &str) -> Result<Vec<f64>, JsValue> {
        let variant = parse_variant(variant)?;
        let run = self
            .config
            .problem(&self.forcing, variant)
            .simulate(&self.config.parameters)
            .map_err(to_js)?;
        Ok(run.flow())
    }

    pub fn loss(&self, variant: &str) -> Result<f64, JsValue> {
        let variant = parse_variant(variant)?;
        let problem = self.config.problem(&self.forcing, variant);
        flow_loss(&problem, &self.config.parameters).map_err(to_js)
    }

    /// Loss gradient in parameter order.
    pub fn gradient(&self, variant: &str) -> Result<Vec<f64>, JsValue> {
        let variant = parse_variant(variant)?;
        let problem = self.config.problem(&self.forcing, variant);
        let (_, grad) = loss_gradient(&problem, &self.config.parameters).map_err(to_js)?;
        Ok(grad.to_array().to_vec())
    }

    /// Loss, NSE, KGE, solver counters and (optionally) the gradient as a JS
    /// object.
    pub fn evaluate(&self, variant: &str, with_gradient: bool) -> Result<JsValue, JsValue> {
        let variant = parse_variant(variant)?;
        let config = BenchmarkConfig {
            gradient: with_gradient,
            ..self.config.clone()
        };
        let evaluation = evaluate_variant(&config, &self.forcing, variant).map_err(to_js)?;
        serde_wasm_bindgen::to_value(&evaluation)
            .map_err(|err| JsValue::from_str(&format!("Failed to serialize evaluation: {err}")))
    }
}

/// Runs the GR4J element model on CSV text with `prec` and `pet` columns and
/// returns its daily internals.
#[wasm_bindgen]
pub fn run_gr4j(csv: &str, data_length: Option<usize>, params: Vec<f64>) -> Result<JsValue, JsValue> {
    console_error_panic_hook::set_once();

    let forcing = Gr4jForcing::from_reader(csv.as_bytes(), data_length).map_err(to_js)?;
    let params = match params.as_slice() {
        [] => Gr4jParameters::default(),
        [x1, x2, x3, x4] => Gr4jParameters {
            x1: *x1,
            x2: *x2,
            x3: *x3,
            x4: *x4,
        },
        _ => {
            return Err(JsValue::from_str(
                "GR4J expects four parameters (x1, x2, x3, x4) or none.",
            ))
        }
    };
    let internals = Gr4jUnit::new(&params)
        .run(&ImplicitEuler::new(Pegasus::default()), &forcing)
        .map_err(to_js)?;
    serde_wasm_bindgen::to_value(&internals)
        .map_err(|err| JsValue::from_str(&format!("Failed to serialize GR4J internals: {err}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_wasm_bindgen::from_value;
    use wasm_bindgen_test::wasm_bindgen_test;

    const CSV: &str = "date,tmean(C),dayl(day),prcp(mm/day),flow(mm)\n\
        2000-01-01,-4.0,0.40,3.0,0.5\n\
        2000-01-02,-1.5,0.40,0.0,0.5\n\
        2000-01-03,1.0,0.41,6.0,0.6\n\
        2000-01-04,3.5,0.41,2.0,0.8\n\
        2000-01-05,6.0,0.42,0.0,0.7\n\
        2000-01-06,4.0,0.42,1.0,0.6\n";

    #[test]
    fn wasm_benchmark_loads_and_truncates_forcing() {
        let bench = WasmBenchmark::new(CSV, Some(4)).expect("forcing should parse");
        assert_eq!(bench.len(), 4);
        assert!(!bench.is_empty());
    }

    #[test]
    fn wasm_benchmark_simulates_every_variant() {
        let bench = WasmBenchmark::new(CSV, None).expect("forcing should parse");
        for name in ["tsit5", "rk45", "rk4", "implicit-euler"] {
            let flow = bench.simulate_flow(name).expect("variant should run");
            assert_eq!(flow.len(), 6, "{name}");
            assert!(flow.iter().all(|q| q.is_finite()), "{name}");
        }
    }

    #[test]
    fn wasm_benchmark_parameters_round_trip() {
        let mut bench = WasmBenchmark::new(CSV, None).expect("forcing should parse");
        let params = vec![-1.0, 0.5, 2.0, 300.0, 10.0, 0.02];
        bench.set_parameters(params.clone()).expect("valid parameters");
        assert_eq!(bench.get_parameters(), params);
    }

    #[test]
    fn wasm_benchmark_gradient_has_one_entry_per_parameter() {
        let bench = WasmBenchmark::new(CSV, None).expect("forcing should parse");
        let grad = bench.gradient("rk4").expect("rk4 is differentiable");
        assert_eq!(grad.len(), 6);
        assert!(grad.iter().all(|g| g.is_finite()));
        let loss = bench.loss("rk4").expect("loss should evaluate");
        assert!(loss >= 0.0);
    }

    #[test]
    fn wasm_benchmark_tolerances_create_controller() {
        let mut bench = WasmBenchmark::new(CSV, None).expect("forcing should parse");
        bench.set_tolerances(1e-6, 1e-7);
        let controller = bench.config.controller.expect("controller set");
        assert_eq!(controller.rtol, 1e-6);
        assert_eq!(controller.atol, 1e-7);
    }

    #[wasm_bindgen_test]
    fn wasm_benchmark_rejects_unknown_variant() {
        let bench = WasmBenchmark::new(CSV, None).expect("forcing should parse");
        let message = bench
            .simulate_flow("euler")
            .err()
            .and_then(|err| err.as_string())
            .unwrap_or_default();
        assert!(message.contains("Unknown variant"));
    }

    #[wasm_bindgen_test]
    fn wasm_benchmark_rejects_malformed_csv() {
        let result = WasmBenchmark::new("tmean(C)\nnot-a-number\n", None);
        assert!(result.is_err(), "should reject malformed forcing");
    }

    #[wasm_bindgen_test]
    fn wasm_benchmark_evaluate_returns_object() {
        let bench = WasmBenchmark::new(CSV, None).expect("forcing should parse");
        let value = bench.evaluate("tsit5", true).expect("evaluation");
        let evaluation: serde_json::Value = from_value(value).expect("evaluation object");
        assert_eq!(evaluation["variant"], "tsit5");
        assert!(evaluation["gradient"].is_object());
    }

    #[wasm_bindgen_test]
    fn wasm_benchmark_hides_gradient_for_implicit_euler() {
        let bench = WasmBenchmark::new(CSV, None).expect("forcing should parse");
        let message = bench
            .gradient("implicit-euler")
            .err()
            .and_then(|err| err.as_string())
            .unwrap_or_default();
        assert!(!message.is_empty());
    }

    #[wasm_bindgen_test]
    fn run_gr4j_returns_internals() {
        let csv = "prec,pet\n5.0,1.0\n0.0,2.0\n12.0,1.5\n";
        let value = run_gr4j(csv, None, Vec::new()).expect("gr4j internals");
        let internals: serde_json::Value = from_value(value).expect("internals object");
        assert_eq!(internals["flow"].as_array().map(|flow| flow.len()), Some(3));

        let message = run_gr4j(csv, None, vec![1.0])
            .err()
            .and_then(|err| err.as_string())
            .unwrap_or_default();
        assert!(message.contains("four parameters"));
    }
}
