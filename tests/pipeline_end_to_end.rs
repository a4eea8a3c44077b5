use perception_kernel::detect::{LabelTable, StubBackend, FAR_DISTANCE};
use perception_kernel::{
    DistanceCategory, InferenceBackend, PipelineSettings, PixelFormat, Pipeline, Plane, RawFrame,
    Tensor,
};

const INPUT: usize = 320;
const CLASSES: usize = 80;
const BOXES: usize = 6;

/// 640x480 mid-gray YUV 4:2:0 frame with padded rows.
fn yuv_frame(format: PixelFormat) -> RawFrame {
    let (width, height) = (640usize, 480usize);
    let luma_stride = width + 32;
    let chroma_stride = width / 2 + 16;
    RawFrame::new(
        width as u32,
        height as u32,
        format,
        vec![
            Plane::new(vec![128; luma_stride * height], luma_stride, 1),
            Plane::new(vec![128; chroma_stride * height / 2], chroma_stride, 1),
            Plane::new(vec![128; chroma_stride * height / 2], chroma_stride, 1),
        ],
    )
}

/// Transposed `(1, 4 + CLASSES, BOXES)` output; each box is `[cx, cy, w, h, class, score]`.
fn transposed_output(boxes: &[[f32; 6]]) -> Tensor {
    let attributes = 4 + CLASSES;
    let mut data = vec![0.0f32; attributes * BOXES];
    for (index, b) in boxes.iter().enumerate() {
        for attribute in 0..4 {
            data[attribute * BOXES + index] = b[attribute];
        }
        data[(4 + b[4] as usize) * BOXES + index] = b[5];
    }
    Tensor::new(vec![1, attributes, BOXES], data).unwrap()
}

/// Standard `(1, BOXES, 4 + CLASSES)` output with the same box encoding.
fn standard_output(boxes: &[[f32; 6]]) -> Tensor {
    let attributes = 4 + CLASSES;
    let mut data = vec![0.0f32; attributes * BOXES];
    for (index, b) in boxes.iter().enumerate() {
        let row = &mut data[index * attributes..(index + 1) * attributes];
        row[..4].copy_from_slice(&b[..4]);
        row[4 + b[4] as usize] = b[5];
    }
    Tensor::new(vec![1, BOXES, attributes], data).unwrap()
}

fn pipeline(output: Tensor, depth_value: Option<f32>) -> Pipeline {
    let detector = StubBackend::new("stub-detector", vec![1, INPUT, INPUT, 3], output);
    let depth = depth_value.map(|value| {
        Box::new(StubBackend::flat_depth(256, value)) as Box<dyn InferenceBackend>
    });
    Pipeline::new(
        Box::new(detector),
        depth,
        LabelTable::coco(),
        PipelineSettings::default(),
    )
    .unwrap()
}

// Box spanning 40-60% of the image on both axes, in 320x320 input pixels.
const CENTER_BOX: [f32; 6] = [160.0, 160.0, 64.0, 64.0, 0.0, 0.9];

#[test]
fn single_candidate_becomes_nearby_person() {
    let mut pipeline = pipeline(transposed_output(&[CENTER_BOX]), Some(100.0));
    let detections = pipeline.run(&yuv_frame(PixelFormat::Yuv420), true).unwrap();

    assert_eq!(detections.len(), 1);
    let person = &detections[0];
    assert_eq!(person.class_name, "person");
    assert!((person.confidence - 0.9).abs() < 1e-6);
    assert!((person.distance - 10.0).abs() < 1e-4);
    assert_eq!(person.category, DistanceCategory::Nearby);
    assert_eq!(person.priority(), 2);
    for (got, want) in [
        (person.bbox.x1, 0.4),
        (person.bbox.y1, 0.4),
        (person.bbox.x2, 0.6),
        (person.bbox.y2, 0.6),
    ] {
        assert!((got - want).abs() < 1e-4, "{} vs {}", got, want);
    }
}

#[test]
fn standard_layout_decodes_identically() {
    let mut transposed = pipeline(transposed_output(&[CENTER_BOX]), Some(100.0));
    let mut standard = pipeline(standard_output(&[CENTER_BOX]), Some(100.0));
    let frame = yuv_frame(PixelFormat::Yuv420);
    assert_eq!(
        transposed.run(&frame, true).unwrap(),
        standard.run(&frame, true).unwrap()
    );
}

#[test]
fn unsupported_format_yields_no_detections() {
    let mut pipeline = pipeline(transposed_output(&[CENTER_BOX]), Some(100.0));
    let frame = yuv_frame(PixelFormat::Other(0x3231_5659));
    let detections = pipeline.run(&frame, true).expect("recoverable");
    assert!(detections.is_empty());
}

#[test]
fn depth_disabled_reports_far() {
    let mut pipeline = pipeline(transposed_output(&[CENTER_BOX]), Some(100.0));
    let detections = pipeline.run(&yuv_frame(PixelFormat::Yuv420), false).unwrap();
    assert_eq!(detections.len(), 1);
    assert_eq!(detections[0].distance, FAR_DISTANCE);
    assert_eq!(detections[0].category, DistanceCategory::Far);
}

#[test]
fn duplicates_are_suppressed_and_low_scores_dropped() {
    let boxes = [
        CENTER_BOX,
        // Same object, shifted by 4 px, lower score: suppressed.
        [164.0, 160.0, 64.0, 64.0, 0.0, 0.7],
        // Separate car in the top-left corner.
        [40.0, 40.0, 40.0, 40.0, 2.0, 0.6],
        // Below the 0.4 threshold.
        [260.0, 260.0, 40.0, 40.0, 16.0, 0.39],
    ];
    let mut pipeline = pipeline(transposed_output(&boxes), Some(100.0));
    let detections = pipeline.run(&yuv_frame(PixelFormat::Yuv420), true).unwrap();

    let names: Vec<&str> = detections.iter().map(|d| d.class_name.as_str()).collect();
    assert_eq!(names, vec!["person", "car"]);
    assert!(detections
        .windows(2)
        .all(|pair| pair[0].priority() <= pair[1].priority()));
}

#[test]
fn surprising_output_shape_yields_no_detections() {
    let output = Tensor::filled(vec![1, 2, 3, 4], 0.9);
    let mut pipeline = pipeline(output, None);
    let detections = pipeline.run(&yuv_frame(PixelFormat::Yuv420), true).unwrap();
    assert!(detections.is_empty());
}

#[test]
fn overflowing_plane_stride_yields_no_detections() {
    let frame = RawFrame::new(
        1,
        3,
        PixelFormat::Bgra8888,
        vec![Plane::new(vec![0; 4], 1usize << 63, 4)],
    );
    let mut pipeline = pipeline(transposed_output(&[CENTER_BOX]), None);
    let detections = pipeline.run(&frame, false).unwrap();
    assert!(detections.is_empty());
}
