use autolevel_communication::firmware::marlin::render_lines;
use autolevel_communication::{CommandParams, LogicalCommand};
use proptest::prelude::*;

fn axis_value() -> impl Strategy<Value = Option<f64>> {
    prop::option::of(-1000.0f64..1000.0)
}

proptest! {
    #[test]
    fn param_string_lists_only_set_axes(
        x in axis_value(),
        y in axis_value(),
        z in axis_value(),
        f in axis_value(),
    ) {
        let params = CommandParams { x, y, z, f, s: None };
        let rendered = params.to_param_string();
        let words: Vec<&str> = rendered.split_whitespace().collect();

        let expected: Vec<char> = [('X', x), ('Y', y), ('Z', z), ('F', f)]
            .into_iter()
            .filter_map(|(axis, value)| value.map(|_| axis))
            .collect();
        prop_assert_eq!(words.len(), expected.len());

        for (word, axis) in words.iter().zip(expected) {
            prop_assert!(word.starts_with(axis));
            let (_, decimals) = word.split_once('.').unwrap();
            prop_assert_eq!(decimals.len(), 8);
        }
    }

    #[test]
    fn move_abs_always_sets_absolute_mode_first(x in -500.0f64..500.0, y in -500.0f64..500.0) {
        let params = CommandParams::new().x(x).y(y);
        let lines = render_lines(LogicalCommand::MoveAbs, Some(&params));
        prop_assert_eq!(lines.len(), 2);
        prop_assert_eq!(lines[0].as_str(), "G90");
        prop_assert_eq!(lines[1].clone(), format!("G0 X{:.8} Y{:.8}", x, y));
    }
}
