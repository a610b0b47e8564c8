//! Reader for OpenCV `FileStorage` cascade files
//!
//! Only the current boosted Haar layout written by `opencv_traincascade` is
//! accepted. Sequences are `<_>` elements and numeric arrays are whitespace
//! separated text.

use super::cascade::{HaarCascade, HaarFeature, HaarRect, Stage, TreeNode, WeakClassifier};
use crate::error::{RetouchError, Result};
use roxmltree::{Document, Node};
use std::str::FromStr;

fn invalid(msg: impl Into<String>) -> RetouchError {
    RetouchError::invalid_config(format!("Invalid cascade XML: {}", msg.into()))
}

fn child<'a, 'input>(node: Node<'a, 'input>, name: &str) -> Option<Node<'a, 'input>> {
    node.children().find(|n| n.is_element() && n.tag_name().name() == name)
}

fn required<'a, 'input>(node: Node<'a, 'input>, name: &str) -> Result<Node<'a, 'input>> {
    child(node, name).ok_or_else(|| invalid(format!("missing <{}> in <{}>", name, node.tag_name().name())))
}

fn items<'a, 'input>(node: Node<'a, 'input>) -> impl Iterator<Item = Node<'a, 'input>> {
    node.children().filter(|n| n.is_element() && n.tag_name().name() == "_")
}

/// Text content with comments stripped
fn text(node: Node<'_, '_>) -> String {
    node.descendants()
        .filter(Node::is_text)
        .filter_map(|n| n.text())
        .collect::<Vec<_>>()
        .join(" ")
}

fn numbers<T: FromStr>(node: Node<'_, '_>) -> Result<Vec<T>> {
    text(node)
        .split_whitespace()
        .map(|token| {
            token
                .parse::<T>()
                .map_err(|_| invalid(format!("bad number '{}' in <{}>", token, node.tag_name().name())))
        })
        .collect()
}

fn scalar<T: FromStr>(node: Node<'_, '_>, name: &str) -> Result<T> {
    let field = required(node, name)?;
    let raw = text(field);
    raw.trim()
        .parse::<T>()
        .map_err(|_| invalid(format!("bad value '{}' in <{}>", raw.trim(), name)))
}

/// Parse the first cascade stored in an OpenCV XML document
pub(super) fn parse_cascade(source: &str) -> Result<HaarCascade> {
    let doc = Document::parse(source).map_err(|e| invalid(e.to_string()))?;
    let storage = doc.root_element();
    if storage.tag_name().name() != "opencv_storage" {
        return Err(invalid("root element is not <opencv_storage>"));
    }
    let cascade = storage
        .children()
        .find(Node::is_element)
        .ok_or_else(|| invalid("no cascade inside <opencv_storage>"))?;

    match cascade.attribute("type_id") {
        Some("opencv-haar-classifier") => {
            return Err(invalid("legacy haartraining format is not supported, convert it with opencv_traincascade"));
        },
        Some("opencv-cascade-classifier") | None => {},
        Some(other) => return Err(invalid(format!("unknown type_id '{other}'"))),
    }

    let stage_type = text(required(cascade, "stageType")?);
    if stage_type.trim() != "BOOST" {
        return Err(invalid(format!("unsupported stage type '{}'", stage_type.trim())));
    }
    let feature_type = text(required(cascade, "featureType")?);
    if feature_type.trim() != "HAAR" {
        return Err(invalid(format!("unsupported feature type '{}'", feature_type.trim())));
    }
    if let Some(params) = child(cascade, "featureParams") {
        if child(params, "maxCatCount").is_some() && scalar::<u32>(params, "maxCatCount")? > 0 {
            return Err(invalid("categorical features are not supported"));
        }
    }

    let window_width = scalar(cascade, "width")?;
    let window_height = scalar(cascade, "height")?;

    let stages = items(required(cascade, "stages")?)
        .map(parse_stage)
        .collect::<Result<Vec<_>>>()?;
    let features = items(required(cascade, "features")?)
        .map(parse_feature)
        .collect::<Result<Vec<_>>>()?;

    Ok(HaarCascade {
        window_width,
        window_height,
        stages,
        features,
    })
}

fn parse_stage(node: Node<'_, '_>) -> Result<Stage> {
    let threshold = scalar(node, "stageThreshold")?;
    let classifiers = items(required(node, "weakClassifiers")?)
        .map(parse_weak)
        .collect::<Result<Vec<_>>>()?;
    Ok(Stage {
        threshold,
        classifiers,
    })
}

fn parse_weak(node: Node<'_, '_>) -> Result<WeakClassifier> {
    let raw: Vec<f64> = numbers(required(node, "internalNodes")?)?;
    if raw.is_empty() || raw.len() % 4 != 0 {
        return Err(invalid(format!("internalNodes holds {} values, expected groups of 4", raw.len())));
    }
    let nodes = raw
        .chunks_exact(4)
        .map(|n| {
            if n[2] < 0.0 {
                return Err(invalid(format!("negative feature index {}", n[2])));
            }
            Ok(TreeNode {
                left: n[0] as i32,
                right: n[1] as i32,
                feature: n[2] as usize,
                threshold: n[3] as f32,
            })
        })
        .collect::<Result<Vec<_>>>()?;
    let leaves = numbers(required(node, "leafValues")?)?;
    Ok(WeakClassifier { nodes, leaves })
}

fn parse_feature(node: Node<'_, '_>) -> Result<HaarFeature> {
    let rects = items(required(node, "rects")?)
        .map(|r| {
            let v: Vec<f64> = numbers(r)?;
            let [x, y, w, h, weight] = v[..] else {
                return Err(invalid(format!("feature rectangle has {} values, expected 5", v.len())));
            };
            if x < 0.0 || y < 0.0 || w <= 0.0 || h <= 0.0 {
                return Err(invalid(format!("feature rectangle {x} {y} {w} {h} is not positive")));
            }
            Ok(HaarRect {
                x: x as u32,
                y: y as u32,
                width: w as u32,
                height: h as u32,
                weight: weight as f32,
            })
        })
        .collect::<Result<Vec<_>>>()?;
    let tilted = match child(node, "tilted") {
        Some(t) => text(t).trim() != "0",
        None => false,
    };
    Ok(HaarFeature { rects, tilted })
}
