use autolevel::{contour_gcode_text, ContourOptions, HeightMap, HeightMapPoint, UnmatchedLines};

#[test]
fn contour_program_against_saved_map() {
    let dir = tempfile::tempdir().unwrap();
    let map_path = dir.path().join("surface.json");

    let points = vec![
        HeightMapPoint::new(0.0, 0.0, 0.0),
        HeightMapPoint::new(10.0, 0.0, 0.2),
        HeightMapPoint::new(0.0, 10.0, 0.0),
        HeightMapPoint::new(10.0, 10.0, 0.2),
    ];
    HeightMap::from_points(points).save_to_file(&map_path).unwrap();
    let map = HeightMap::load_from_file(&map_path).unwrap();

    let program = "(pcb isolation)\nG21\nG0 Z2\nG0 X5 Y1\nG1 X5 Y1 F100\nG0 Z2\nM5\n";
    let options = ContourOptions::new(0.1);
    let text = contour_gcode_text(program, &map, &options).unwrap();

    assert_eq!(
        text.lines().collect::<Vec<_>>(),
        vec![
            "G0 Z2.00000000",
            "G0 X5.00000000 Y1.00000000",
            "G0 X5.00000000 Y1.00000000 Z0.00000000",
            "G1 X5.00000000 Y1.00000000 Z0.00000000 F100.00000000",
            "G0 Z2.00000000",
        ]
    );

    let passthrough = options.with_unmatched(UnmatchedLines::PassThrough);
    let text = contour_gcode_text(program, &map, &passthrough).unwrap();
    assert!(text.starts_with("G21\n"));
    assert!(text.ends_with("M5"));
}
