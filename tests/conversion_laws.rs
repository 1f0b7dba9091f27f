use mdf_engine::{Conversion, ConversionKind, Value};
use proptest::prelude::*;

fn close(a: f64, b: f64) -> bool {
    (a - b).abs() <= 1e-9 * a.abs().max(b.abs()).max(1.0)
}

proptest! {
    #[test]
    fn linear_law(offset in -1e6f64..1e6, factor in -1e3f64..1e3, raw in any::<i32>()) {
        let conv = Conversion::linear(offset, factor);
        let eng = conv.apply(&Value::SignedInteger(i64::from(raw)));
        let expected = offset + factor * f64::from(raw);
        prop_assert!(close(eng.as_f64().unwrap(), expected));
    }

    #[test]
    fn double_inverse_restores_coefficients(
        offset in -1e6f64..1e6,
        factor in prop_oneof![-1e3f64..-1e-3, 1e-3f64..1e3],
    ) {
        let conv = Conversion::linear(offset, factor);
        let back = conv.inverted().unwrap().inverted().unwrap();
        match back.kind {
            ConversionKind::Linear { offset: o, factor: f } => {
                prop_assert!(close(o, offset));
                prop_assert!(close(f, factor));
            }
            other => prop_assert!(false, "unexpected kind {other:?}"),
        }
    }

    #[test]
    fn inverse_undoes_forward(
        offset in -1e3f64..1e3,
        factor in prop_oneof![-1e2f64..-1e-2, 1e-2f64..1e2],
        x in -1e4f64..1e4,
    ) {
        let conv = Conversion::linear(offset, factor);
        let inverse = conv.inverted().unwrap();
        let y = conv.apply_f64(x, false);
        prop_assert!(close(inverse.apply_f64(y, false), x) || (inverse.apply_f64(y, false) - x).abs() < 1e-6);
    }

    #[test]
    fn value_tables_clamp(x in -100f64..200.0) {
        let conv = Conversion::value_to_value(vec![(0.0, 10.0), (100.0, 20.0)], true);
        let y = conv.apply_f64(x, false);
        prop_assert!((10.0..=20.0).contains(&y));
    }
}
