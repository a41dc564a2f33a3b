//! Camera frames.
//!
//! A frame is an opaque row-major byte buffer plus its shape. Pixels are
//! one byte per channel.

use crate::error::ProtocolError;
use crate::message::{Message, MessageKind};
use bson::spec::BinarySubtype;
use bson::Binary;
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Frame dimensions. Single-channel frames carry no channel dimension.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ImageShape {
    pub height: usize,
    pub width: usize,
    pub channels: Option<usize>,
}

impl ImageShape {
    /// A two-dimensional (single-channel) shape.
    #[must_use]
    pub const fn new(height: usize, width: usize) -> Self {
        Self {
            height,
            width,
            channels: None,
        }
    }

    #[must_use]
    pub const fn with_channels(mut self, channels: usize) -> Self {
        self.channels = Some(channels);
        self
    }

    /// Number of bytes a buffer of this shape holds, `None` on overflow.
    #[must_use]
    pub fn len(&self) -> Option<usize> {
        self.height
            .checked_mul(self.width)?
            .checked_mul(self.channels.unwrap_or(1))
    }

    /// Whether the shape holds no pixels.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == Some(0)
    }

    /// Dimensions as written on the wire.
    #[must_use]
    pub fn dims(&self) -> Vec<usize> {
        match self.channels {
            Some(channels) => vec![self.height, self.width, channels],
            None => vec![self.height, self.width],
        }
    }

    /// Parse wire dimensions.
    ///
    /// # Errors
    ///
    /// Returns [`ProtocolError::ShapeMismatch`] unless there are 2 or 3
    /// dimensions.
    pub fn from_dims(dims: &[usize]) -> Result<Self, ProtocolError> {
        match *dims {
            [height, width] => Ok(Self::new(height, width)),
            [height, width, channels] => Ok(Self::new(height, width).with_channels(channels)),
            _ => Err(ProtocolError::ShapeMismatch {
                field: "shape",
                expected: 3,
                actual: dims.len(),
            }),
        }
    }
}

impl fmt::Display for ImageShape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.channels {
            Some(channels) => write!(f, "({}, {}, {})", self.height, self.width, channels),
            None => write!(f, "({}, {})", self.height, self.width),
        }
    }
}

/// A captured camera frame.
#[derive(Clone, PartialEq, Eq)]
pub struct CapturedImage {
    data: Bytes,
    shape: ImageShape,
}

#[derive(Serialize, Deserialize)]
struct CapturedImageWire {
    data: Binary,
    shape: Vec<i64>,
}

impl CapturedImage {
    /// Wrap a buffer, checking it matches `shape`.
    ///
    /// # Errors
    ///
    /// Returns [`ProtocolError::ShapeMismatch`] if the buffer length differs
    /// from the number of bytes `shape` describes.
    pub fn new(data: impl Into<Bytes>, shape: ImageShape) -> Result<Self, ProtocolError> {
        let data = data.into();
        let expected = shape.len().ok_or_else(|| {
            ProtocolError::payload(
                MessageKind::PushCapturedImage.as_str(),
                format!("shape {shape} is too large"),
            )
        })?;
        if data.len() != expected {
            return Err(ProtocolError::ShapeMismatch {
                field: "data",
                expected,
                actual: data.len(),
            });
        }
        Ok(Self { data, shape })
    }

    /// A frame of `shape` with every byte set to `value`.
    ///
    /// # Errors
    ///
    /// Fails only if the shape overflows.
    pub fn filled(shape: ImageShape, value: u8) -> Result<Self, ProtocolError> {
        let len = shape.len().ok_or_else(|| {
            ProtocolError::payload(
                MessageKind::PushCapturedImage.as_str(),
                format!("shape {shape} is too large"),
            )
        })?;
        Self::new(vec![value; len], shape)
    }

    #[must_use]
    pub fn data(&self) -> &Bytes {
        &self.data
    }

    #[must_use]
    pub fn shape(&self) -> ImageShape {
        self.shape
    }

    /// Byte at `(row, col, channel)`. Use channel 0 for single-channel frames.
    #[must_use]
    pub fn pixel(&self, row: usize, col: usize, channel: usize) -> Option<u8> {
        let channels = self.shape.channels.unwrap_or(1);
        if row >= self.shape.height || col >= self.shape.width || channel >= channels {
            return None;
        }
        let index = (row * self.shape.width + col) * channels + channel;
        self.data.get(index).copied()
    }

    /// Serialize as a `push_captured_image` message bound to a client.
    ///
    /// # Errors
    ///
    /// Returns [`ProtocolError::BsonEncode`] if the fields cannot be encoded,
    /// or [`ProtocolError::InvalidPayload`] if a dimension exceeds `i64`.
    pub fn to_message(&self) -> Result<Message, ProtocolError> {
        let shape = self
            .shape
            .dims()
            .into_iter()
            .map(i64::try_from)
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| ProtocolError::payload(MessageKind::PushCapturedImage.as_str(), e))?;
        let wire = CapturedImageWire {
            data: Binary {
                subtype: BinarySubtype::Generic,
                bytes: self.data.to_vec(),
            },
            shape,
        };
        let fields = bson::to_document(&wire)?;
        Ok(Message::to_client(MessageKind::PushCapturedImage).with_fields(fields))
    }

    /// Read a frame out of a `push_captured_image` message, reshaping the
    /// buffer against the declared shape.
    ///
    /// # Errors
    ///
    /// Returns [`ProtocolError::UnexpectedKind`] for other message types,
    /// [`ProtocolError::InvalidPayload`] for missing or negative fields and
    /// [`ProtocolError::ShapeMismatch`] if the buffer does not fit the shape.
    pub fn from_message(message: &Message) -> Result<Self, ProtocolError> {
        message.expect_kind(&MessageKind::PushCapturedImage)?;

        let wire: CapturedImageWire = bson::from_document(message.document().clone())
            .map_err(|e| ProtocolError::payload(MessageKind::PushCapturedImage.as_str(), e))?;

        let dims = wire
            .shape
            .into_iter()
            .map(usize::try_from)
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| ProtocolError::payload(MessageKind::PushCapturedImage.as_str(), e))?;

        Self::new(wire.data.bytes, ImageShape::from_dims(&dims)?)
    }
}

impl fmt::Debug for CapturedImage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CapturedImage")
            .field("shape", &self.shape)
            .field("len", &self.data.len())
            .finish()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::codec::{decode, encode, WireFormat};
    use crate::message::BoundTo;
    use bson::{doc, Bson};

    #[test]
    fn test_shape_len() {
        assert_eq!(ImageShape::new(3, 4).len(), Some(12));
        assert_eq!(ImageShape::new(3, 4).with_channels(3).len(), Some(36));
        assert_eq!(ImageShape::new(usize::MAX, 2).len(), None);
        assert!(ImageShape::new(0, 4).is_empty());
    }

    #[test]
    fn test_shape_from_dims() {
        assert_eq!(ImageShape::from_dims(&[2, 5]).unwrap(), ImageShape::new(2, 5));
        assert_eq!(
            ImageShape::from_dims(&[2, 5, 3]).unwrap(),
            ImageShape::new(2, 5).with_channels(3)
        );
        assert!(ImageShape::from_dims(&[7]).is_err());
        assert!(ImageShape::from_dims(&[1, 2, 3, 4]).is_err());
    }

    #[test]
    fn test_new_rejects_length_mismatch() {
        let result = CapturedImage::new(vec![0_u8; 11], ImageShape::new(3, 4));
        assert!(matches!(
            result,
            Err(ProtocolError::ShapeMismatch {
                field: "data",
                expected: 12,
                actual: 11
            })
        ));
    }

    #[test]
    fn test_filled_frame_round_trips() {
        let image = CapturedImage::filled(ImageShape::new(3, 4), 1).unwrap();

        let decoded = decode(&encode(&image.to_message().unwrap()).unwrap()).unwrap();
        let parsed = CapturedImage::from_message(&decoded).unwrap();

        assert_eq!(parsed.shape(), ImageShape::new(3, 4));
        assert_eq!(parsed.data().len(), 12);
        assert!(parsed.data().iter().all(|&b| b == 1));
    }

    #[test]
    fn test_json_wire_keeps_binary() {
        let image =
            CapturedImage::new(vec![0_u8, 127, 255, 8], ImageShape::new(2, 2)).unwrap();

        let bytes = WireFormat::Json.encode(&image.to_message().unwrap()).unwrap();
        let parsed =
            CapturedImage::from_message(&WireFormat::Json.decode(&bytes).unwrap()).unwrap();

        assert_eq!(parsed, image);
    }

    #[test]
    fn test_wire_layout() {
        let image = CapturedImage::filled(ImageShape::new(1, 2).with_channels(3), 9).unwrap();
        let message = image.to_message().unwrap();

        assert_eq!(message.bound_to(), BoundTo::Client);
        assert_eq!(
            message.get("shape"),
            Some(&Bson::Array(vec![
                Bson::Int64(1),
                Bson::Int64(2),
                Bson::Int64(3)
            ]))
        );
        assert_eq!(
            message.get("data"),
            Some(&Bson::Binary(Binary {
                subtype: BinarySubtype::Generic,
                bytes: vec![9; 6],
            }))
        );
    }

    #[test]
    fn test_from_message_rejects_shape_mismatch() {
        let data = Binary {
            subtype: BinarySubtype::Generic,
            bytes: vec![1, 2, 3],
        };
        let message = Message::from_document(doc! {
            "type": "push_captured_image",
            "bound_to": "client",
            "data": data,
            "shape": [2_i32, 2_i32],
        })
        .unwrap();

        let result = CapturedImage::from_message(&message);
        assert!(matches!(result, Err(ProtocolError::ShapeMismatch { .. })));
    }

    #[test]
    fn test_from_message_rejects_negative_dimension() {
        let data = Binary {
            subtype: BinarySubtype::Generic,
            bytes: Vec::new(),
        };
        let message = Message::from_document(doc! {
            "type": "push_captured_image",
            "bound_to": "client",
            "data": data,
            "shape": [-1_i32, 0_i32],
        })
        .unwrap();

        let result = CapturedImage::from_message(&message);
        assert!(matches!(result, Err(ProtocolError::InvalidPayload { .. })));
    }

    #[test]
    fn test_pixel_lookup() {
        let image = CapturedImage::new(
            vec![10_u8, 11, 12, 20, 21, 22],
            ImageShape::new(1, 2).with_channels(3),
        )
        .unwrap();

        assert_eq!(image.pixel(0, 1, 2), Some(22));
        assert_eq!(image.pixel(0, 0, 1), Some(11));
        assert_eq!(image.pixel(1, 0, 0), None);
        assert_eq!(image.pixel(0, 0, 3), None);
    }

    #[test]
    fn test_debug_does_not_dump_pixels() {
        let image = CapturedImage::filled(ImageShape::new(2, 2), 200).unwrap();
        let debug = format!("{image:?}");
        assert!(debug.contains("len: 4"));
        assert!(!debug.contains("200"));
    }
}
