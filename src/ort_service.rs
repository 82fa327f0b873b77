use crate::{
    config::{ModelConfig, Validatable},
    frame::Frame,
    model_service::{Detection, ModelError, ModelService},
};
use async_trait::async_trait;
use image::{imageops::FilterType, GenericImageView};
use ndarray::{s, Array, ArrayD, ArrayView2, Axis, Ix3, Ix4};
use ort::{
    session::{builder::GraphOptimizationLevel, Session},
    value::TensorRef,
};
use std::sync::{
    atomic::{AtomicUsize, Ordering},
    Arc, Mutex,
};

/// Number of box coordinates preceding the class scores in each YOLO anchor row.
const BOX_VALUES: usize = 4;

/// Output tensor name of YOLOv8 ONNX exports.
const OUTPUT_NAME: &str = "output0";

fn intersection(box1: &Detection, box2: &Detection) -> f32 {
    let width = box1.x2.min(box2.x2) - box1.x1.max(box2.x1);
    let height = box1.y2.min(box2.y2) - box1.y1.max(box2.y1);
    width.max(0.) * height.max(0.)
}

fn union(box1: &Detection, box2: &Detection) -> f32 {
    ((box1.x2 - box1.x1) * (box1.y2 - box1.y1)) + ((box2.x2 - box2.x1) * (box2.y2 - box2.y1))
        - intersection(box1, box2)
}

fn iou(box1: &Detection, box2: &Detection) -> f32 {
    intersection(box1, box2) / union(box1, box2)
}

fn transform_frame(frame: &Frame, input_size: u32) -> (Array<f32, Ix4>, u32, u32) {
    let (img_width, img_height) = frame.dimensions();
    let img = frame
        .image()
        .resize_exact(input_size, input_size, FilterType::CatmullRom);

    let size = input_size as usize;
    let mut input = Array::zeros((1, 3, size, size));
    for pixel in img.pixels() {
        let x = pixel.0 as usize;
        let y = pixel.1 as usize;
        let [r, g, b, _] = pixel.2 .0;
        input[[0, 0, y, x]] = (r as f32) / 255.;
        input[[0, 1, y, x]] = (g as f32) / 255.;
        input[[0, 2, y, x]] = (b as f32) / 255.;
    }

    (input, img_width, img_height)
}

/// Decodes a `[1, 4 + classes, anchors]` YOLO output into boxes in source pixels.
fn extract_detections(
    output: ArrayD<f32>,
    img_width: u32,
    img_height: u32,
    input_size: u32,
    min_probability: f32,
) -> Result<Vec<Detection>, ModelError> {
    let output = output
        .into_dimensionality::<Ix3>()
        .map_err(|e| ModelError::Output(format!("expected a 3D tensor: {}", e)))?;
    if output.shape()[0] != 1 || output.shape()[1] <= BOX_VALUES {
        return Err(ModelError::Output(format!(
            "unsupported output shape {:?}",
            output.shape()
        )));
    }

    let scale_x = img_width as f32 / input_size as f32;
    let scale_y = img_height as f32 / input_size as f32;

    let anchors: ArrayView2<f32> = output.slice(s![0, .., ..]);
    let mut boxes = Vec::new();
    for row in anchors.t().axis_iter(Axis(0)) {
        let best = row
            .iter()
            .skip(BOX_VALUES)
            .copied()
            .enumerate()
            .reduce(|accum, item| if item.1 > accum.1 { item } else { accum });
        let Some((class_index, prob)) = best else {
            continue;
        };

        if prob < min_probability {
            continue;
        }

        let xc = row[0] * scale_x;
        let yc = row[1] * scale_y;
        let w = row[2] * scale_x;
        let h = row[3] * scale_y;

        boxes.push(Detection {
            class_index,
            confidence: prob,
            x1: xc - w / 2.,
            y1: yc - h / 2.,
            x2: xc + w / 2.,
            y2: yc + h / 2.,
        });
    }

    Ok(boxes)
}

/// Per-class non-max suppression, highest confidence first.
fn non_max_suppression(mut boxes: Vec<Detection>, iou_threshold: f32) -> Vec<Detection> {
    boxes.sort_by(|box1, box2| box2.confidence.total_cmp(&box1.confidence));

    let mut result = Vec::new();
    while !boxes.is_empty() {
        let best = boxes.remove(0);
        boxes.retain(|other| {
            other.class_index != best.class_index || iou(&best, other) < iou_threshold
        });
        result.push(best);
    }
    result
}

#[cfg(any(feature = "cuda", feature = "tensorrt"))]
fn execution_providers() -> Vec<ort::execution_providers::ExecutionProviderDispatch> {
    let mut providers = Vec::new();
    #[cfg(feature = "tensorrt")]
    providers.push(
        ort::execution_providers::TensorRTExecutionProvider::default()
            .with_engine_cache(true)
            .build(),
    );
    #[cfg(feature = "cuda")]
    providers.push(ort::execution_providers::CUDAExecutionProvider::default().build());
    providers
}

#[derive(Clone)]
pub struct OrtModelService {
    sessions: Arc<Vec<Arc<Mutex<Session>>>>,
    counter: Arc<AtomicUsize>,
    input_size: u32,
    min_probability: f32,
    iou_threshold: f32,
}

impl OrtModelService {
    pub fn new(model_config: &ModelConfig) -> Result<Self, ModelError> {
        #[cfg(any(feature = "cuda", feature = "tensorrt"))]
        ort::init()
            .with_execution_providers(execution_providers())
            .commit()?;

        let num_instances = model_config.num_instances.max(1);
        let sessions = (0..num_instances)
            .map(|_| {
                let session = Session::builder()?
                    .with_optimization_level(GraphOptimizationLevel::Level3)?
                    .commit_from_file(model_config.get_path())?;
                Ok(Arc::new(Mutex::new(session)))
            })
            .collect::<Result<Vec<_>, ort::Error>>()?;

        tracing::info!(
            "Created {} ONNX sessions from {:?}",
            num_instances,
            model_config.get_path()
        );

        Ok(Self {
            sessions: Arc::new(sessions),
            counter: Arc::new(AtomicUsize::new(0)),
            input_size: model_config.input_size,
            min_probability: model_config.min_probability,
            iou_threshold: model_config.iou_threshold,
        })
    }

    fn run_inference(&self, input: &Array<f32, Ix4>) -> Result<ArrayD<f32>, ModelError> {
        let index = self.counter.fetch_add(1, Ordering::Relaxed) % self.sessions.len();
        let mut session = self.sessions[index]
            .lock()
            .map_err(|e| ModelError::Poisoned(e.to_string()))?;

        tracing::debug!("Handling frame with session {}", index);
        let tensor_ref = TensorRef::from_array_view(input.view())?;
        let outputs = session.run(ort::inputs![tensor_ref])?;
        let output = outputs[OUTPUT_NAME].try_extract_array::<f32>()?.to_owned();
        Ok(output)
    }

    /// Blocking detection on the calling thread.
    pub fn detect(&self, frame: &Frame) -> Result<Vec<Detection>, ModelError> {
        let (input, img_width, img_height) = transform_frame(frame, self.input_size);
        let output = self.run_inference(&input)?;
        let boxes = extract_detections(
            output,
            img_width,
            img_height,
            self.input_size,
            self.min_probability,
        )?;
        Ok(non_max_suppression(boxes, self.iou_threshold))
    }
}

#[async_trait]
impl ModelService for OrtModelService {
    async fn predict(&self, frame: Frame) -> Result<Vec<Detection>, ModelError> {
        let service = self.clone();
        tokio::task::spawn_blocking(move || service.detect(&frame)).await?
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{DynamicImage, ImageBuffer, Rgb};
    use ndarray::Array3;

    fn detection(
        class_index: usize,
        confidence: f32,
        x1: f32,
        y1: f32,
        x2: f32,
        y2: f32,
    ) -> Detection {
        Detection {
            class_index,
            confidence,
            x1,
            y1,
            x2,
            y2,
        }
    }

    #[test]
    fn test_transform_frame() {
        let img = ImageBuffer::<Rgb<u8>, Vec<u8>>::from_pixel(100, 50, Rgb([255, 0, 0]));
        let frame = Frame::new(DynamicImage::ImageRgb8(img));

        let (input, img_width, img_height) = transform_frame(&frame, 64);

        assert_eq!(input.shape(), &[1, 3, 64, 64]);
        assert_eq!(img_width, 100);
        assert_eq!(img_height, 50);
        assert!(input[[0, 0, 10, 10]] > 0.99);
        assert!(input[[0, 1, 10, 10]] < 0.01);
    }

    #[test]
    fn test_extract_detections_rescales_and_filters() {
        // Two anchors, three classes.
        let mut output = Array3::<f32>::zeros((1, 7, 2));
        for (feature, value) in [320., 320., 64., 64., 0.1, 0.9, 0.2].into_iter().enumerate() {
            output[[0, feature, 0]] = value;
        }
        for (feature, value) in [100., 100., 10., 10., 0.1, 0.1, 0.1].into_iter().enumerate() {
            output[[0, feature, 1]] = value;
        }

        let boxes = extract_detections(output.into_dyn(), 1280, 640, 640, 0.25).unwrap();

        assert_eq!(boxes, vec![detection(1, 0.9, 576., 288., 704., 352.)]);
    }

    #[test]
    fn test_extract_detections_rejects_bad_shape() {
        let output = ndarray::Array2::<f32>::zeros((7, 2)).into_dyn();
        assert!(matches!(
            extract_detections(output, 640, 640, 640, 0.25),
            Err(ModelError::Output(_))
        ));
    }

    #[test]
    fn test_nms_suppresses_overlapping_same_class() {
        let boxes = vec![
            detection(0, 0.6, 0., 0., 100., 100.),
            detection(0, 0.9, 2., 2., 102., 102.),
            detection(0, 0.5, 300., 300., 400., 400.),
        ];

        let kept = non_max_suppression(boxes, 0.7);

        assert_eq!(kept.len(), 2);
        assert_eq!(kept[0].confidence, 0.9);
        assert_eq!(kept[1].confidence, 0.5);
    }

    #[test]
    fn test_nms_keeps_overlapping_different_classes() {
        let boxes = vec![
            detection(0, 0.9, 0., 0., 100., 100.),
            detection(3, 0.8, 0., 0., 100., 100.),
        ];

        let kept = non_max_suppression(boxes, 0.7);

        assert_eq!(kept.len(), 2);
        assert_eq!(kept[1].class_index, 3);
    }

    #[test]
    fn test_iou_disjoint_boxes() {
        let a = detection(0, 1., 0., 0., 10., 10.);
        let b = detection(0, 1., 20., 20., 30., 30.);
        assert_eq!(iou(&a, &b), 0.);
    }
}
