//! Greedy CTC decoding of recognizer outputs.

use crate::core::{OCRError, OcrResult};
use std::path::Path;

/// Maps CTC class indices to characters.
///
/// Index 0 is the blank token; the dictionary follows, then an optional space.
#[derive(Debug, Clone)]
pub struct CTCLabelDecode {
    character: Vec<String>,
}

impl CTCLabelDecode {
    /// Builds a decoder from a dictionary with one token per line.
    pub fn from_dict_str(dict: &str, use_space_char: bool) -> Self {
        let mut character = vec![String::from("blank")];
        character.extend(
            dict.lines()
                .map(|line| line.trim_end_matches('\r'))
                .filter(|line| !line.is_empty())
                .map(str::to_string),
        );
        if use_space_char {
            character.push(" ".to_string());
        }
        Self { character }
    }

    /// Reads the dictionary file at `path`.
    pub fn from_file(path: &Path, use_space_char: bool) -> OcrResult<Self> {
        let dict = std::fs::read_to_string(path).map_err(|e| {
            OCRError::config_error_detailed(
                format!("character dictionary '{}'", path.display()),
                e.to_string(),
            )
        })?;
        let decoder = Self::from_dict_str(&dict, use_space_char);
        if decoder.num_classes() <= 1 {
            return Err(OCRError::config_error_detailed(
                format!("character dictionary '{}'", path.display()),
                "dictionary is empty",
            ));
        }
        Ok(decoder)
    }

    /// Number of classes the recognizer must output, blank included.
    pub fn num_classes(&self) -> usize {
        self.character.len()
    }

    /// Decodes a `[B, T, C]` probability tensor.
    ///
    /// Repeated indices are merged and blanks removed. The confidence of a line
    /// is the mean of the kept steps' maximum probability, or 0 for an empty line.
    pub fn decode(&self, shape: &[i64], data: &[f32]) -> OcrResult<Vec<(String, f32)>> {
        let &[batch, steps, classes] = shape else {
            return Err(OCRError::tensor_shape("ctc decode", "[batch, steps, classes]", shape));
        };
        if shape.iter().any(|&dim| dim < 0) {
            return Err(OCRError::tensor_shape("ctc decode", "non-negative dimensions", shape));
        }
        let (batch, steps, classes) = (batch as usize, steps as usize, classes as usize);
        if classes != self.num_classes() || data.len() != batch * steps * classes {
            return Err(OCRError::tensor_shape(
                "ctc decode",
                &format!("{} classes matching the dictionary", self.num_classes()),
                shape,
            ));
        }
        // A sequence with no time steps decodes to nothing.
        if steps == 0 {
            return Ok(vec![(String::new(), 0.0); batch]);
        }

        let results = data
            .chunks_exact(steps * classes)
            .map(|sequence| {
                let mut text = String::new();
                let mut probs = Vec::new();
                let mut previous = None;

                for step in sequence.chunks_exact(classes) {
                    let (idx, prob) = step
                        .iter()
                        .copied()
                        .enumerate()
                        .fold((0, f32::NEG_INFINITY), |best, (i, p)| {
                            if p > best.1 { (i, p) } else { best }
                        });
                    if idx != 0 && previous != Some(idx) {
                        text.push_str(&self.character[idx]);
                        probs.push(prob);
                    }
                    previous = Some(idx);
                }

                let confidence = if probs.is_empty() {
                    0.0
                } else {
                    probs.iter().sum::<f32>() / probs.len() as f32
                };
                (text, confidence)
            })
            .collect();

        Ok(results)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn one_hot(indices: &[usize], classes: usize, prob: f32) -> Vec<f32> {
        let mut data = vec![0.0; indices.len() * classes];
        for (t, &idx) in indices.iter().enumerate() {
            data[t * classes + idx] = prob;
        }
        data
    }

    #[test]
    fn test_blank_and_repeats_are_collapsed() {
        // classes: blank, a, b, c, space
        let decoder = CTCLabelDecode::from_dict_str("a\nb\nc\n", true);
        assert_eq!(decoder.num_classes(), 5);

        let data = one_hot(&[1, 1, 0, 1, 2, 2, 4, 3], 5, 0.8);
        let out = decoder.decode(&[1, 8, 5], &data).unwrap();
        assert_eq!(out[0].0, "aab c");
        assert!((out[0].1 - 0.8).abs() < 1e-6);
    }

    #[test]
    fn test_all_blank_sequence_is_empty() {
        let decoder = CTCLabelDecode::from_dict_str("a\nb", false);
        let data = one_hot(&[0, 0, 0], 3, 0.9);
        let out = decoder.decode(&[1, 3, 3], &data).unwrap();
        assert_eq!(out, vec![(String::new(), 0.0)]);
    }

    #[test]
    fn test_batch_decoding() {
        let decoder = CTCLabelDecode::from_dict_str("x\ny", false);
        let mut data = one_hot(&[1, 2], 3, 1.0);
        data.extend(one_hot(&[2, 0], 3, 1.0));
        let out = decoder.decode(&[2, 2, 3], &data).unwrap();
        assert_eq!(out[0].0, "xy");
        assert_eq!(out[1].0, "y");
    }

    #[test]
    fn test_zero_length_sequences_decode_to_empty_text() {
        let decoder = CTCLabelDecode::from_dict_str("a\nb", false);
        let out = decoder.decode(&[2, 0, 3], &[]).unwrap();
        assert_eq!(out, vec![(String::new(), 0.0), (String::new(), 0.0)]);
    }

    #[test]
    fn test_negative_dimensions_are_rejected() {
        let decoder = CTCLabelDecode::from_dict_str("a\nb", false);
        let err = decoder.decode(&[-1, 2, 3], &[0.0; 6]).unwrap_err();
        assert!(matches!(err, OCRError::TensorShape { .. }));
    }

    #[test]
    fn test_class_count_mismatch_is_rejected() {
        let decoder = CTCLabelDecode::from_dict_str("a\nb", false);
        let err = decoder.decode(&[1, 2, 7], &[0.0; 14]).unwrap_err();
        assert!(matches!(err, OCRError::TensorShape { .. }));
    }
}
