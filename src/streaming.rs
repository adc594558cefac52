//! Streaming event emitter.
//!
//! One producer thread walks the document and pushes events into a
//! bounded channel; the consumer's pace drives backpressure, the send
//! blocking when the buffer is full. Events follow a fixed grammar:
//!
//! ```text
//! DocumentStart Metadata? (PageStart ResourceRef* ContentOperation*
//!                          Annotation* PageEnd)* DocumentEnd
//! ```
//!
//! Within a page, resource references are emitted before the content
//! operations of the first stream. Page indices are strictly monotonic.
//! A cancelled emitter stops producing and closes the channel.

use std::sync::Arc;
use std::sync::mpsc::{Receiver, SyncSender, sync_channel};
use std::thread;

use crate::cancel::CancelToken;
use crate::content::{Operation, parse_operations};
use crate::object::Dict;
use crate::semantic::{Rect, SemanticDocument};

/// Default bound of the event buffer.
pub const DEFAULT_BUFFER: usize = 64;

/// Which resource map a `ResourceRef` event names.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceKind {
    /// Font resource
    Font,
    /// XObject resource
    XObject,
    /// Pattern resource
    Pattern,
    /// Shading resource
    Shading,
    /// Extended graphics state
    ExtGState,
    /// Colour space
    ColorSpace,
}

/// One streaming event.
#[derive(Debug, Clone)]
pub enum StreamEvent {
    /// Document opened
    DocumentStart {
        /// Header version
        version: String,
        /// Total page count
        page_count: usize,
    },
    /// Document information dictionary, when non-empty
    Metadata {
        /// The /Info dictionary
        info: Dict,
    },
    /// A page begins
    PageStart {
        /// Zero-based page index
        index: usize,
        /// Effective media box
        media_box: Rect,
    },
    /// A named resource the page carries
    ResourceRef {
        /// Page index
        page: usize,
        /// Resource map the name belongs to
        kind: ResourceKind,
        /// Resource name
        name: String,
    },
    /// One parsed content operation
    ContentOperation {
        /// Page index
        page: usize,
        /// The operation
        operation: Operation,
    },
    /// One annotation subtype present on the page
    Annotation {
        /// Page index
        page: usize,
        /// /Subtype value
        subtype: String,
    },
    /// A page is complete
    PageEnd {
        /// Zero-based page index
        index: usize,
    },
    /// Document walk finished
    DocumentEnd,
}

/// Start the producer task and hand back the consuming end.
///
/// The producer stops early when the consumer drops the receiver or the
/// token fires; either way the channel closes.
pub fn stream_document(
    doc: Arc<SemanticDocument>,
    buffer: usize,
    cancel: CancelToken,
) -> Receiver<StreamEvent> {
    let (sender, receiver) = sync_channel(buffer.max(1));
    thread::spawn(move || {
        let _ = produce(&doc, &sender, &cancel);
    });
    receiver
}

/// Walk the document, pushing events in grammar order. Returns Err when
/// the consumer went away; cancellation just stops the walk.
fn produce(
    doc: &SemanticDocument,
    sender: &SyncSender<StreamEvent>,
    cancel: &CancelToken,
) -> std::result::Result<(), std::sync::mpsc::SendError<StreamEvent>> {
    sender.send(StreamEvent::DocumentStart {
        version: doc.version.clone(),
        page_count: doc.pages.len(),
    })?;

    if !doc.info.is_empty() {
        sender.send(StreamEvent::Metadata {
            info: doc.info.clone(),
        })?;
    }

    for (index, page) in doc.pages.iter().enumerate() {
        if cancel.is_cancelled() {
            return Ok(());
        }
        sender.send(StreamEvent::PageStart {
            index,
            media_box: page.effective_media_box(),
        })?;

        let resources = &page.resources;
        let named = [
            (ResourceKind::Font, resources.fonts.keys().collect::<Vec<_>>()),
            (ResourceKind::XObject, resources.xobjects.keys().collect()),
            (ResourceKind::Pattern, resources.patterns.keys().collect()),
            (ResourceKind::Shading, resources.shadings.keys().collect()),
            (ResourceKind::ExtGState, resources.ext_g_states.keys().collect()),
            (ResourceKind::ColorSpace, resources.color_spaces.keys().collect()),
        ];
        for (kind, names) in named {
            for name in names {
                sender.send(StreamEvent::ResourceRef {
                    page: index,
                    kind,
                    name: name.clone(),
                })?;
            }
        }

        if !page.contents.is_empty() {
            match parse_operations(&page.joined_contents()) {
                Ok(operations) => {
                    for operation in operations {
                        if cancel.is_cancelled() {
                            return Ok(());
                        }
                        sender.send(StreamEvent::ContentOperation {
                            page: index,
                            operation,
                        })?;
                    }
                },
                Err(e) => log::warn!("page {} content unparseable: {}", index, e),
            }
        }

        for annotation in &page.annotations {
            sender.send(StreamEvent::Annotation {
                page: index,
                subtype: annotation.subtype.clone(),
            })?;
        }

        sender.send(StreamEvent::PageEnd { index })?;
    }

    sender.send(StreamEvent::DocumentEnd)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::semantic::Page;

    fn sample_doc() -> Arc<SemanticDocument> {
        let mut doc = SemanticDocument {
            version: "1.7".to_string(),
            ..Default::default()
        };
        for text in [&b"(a) Tj"[..], &b"(b) Tj"[..]] {
            let mut page = Page::default();
            page.contents.push(bytes::Bytes::copy_from_slice(text));
            page.resources.fonts.insert(
                "F1".to_string(),
                crate::semantic::Font::default(),
            );
            doc.pages.push(page);
        }
        Arc::new(doc)
    }

    #[test]
    fn test_event_grammar_order() {
        let events: Vec<StreamEvent> =
            stream_document(sample_doc(), 8, CancelToken::new()).into_iter().collect();

        assert!(matches!(events.first(), Some(StreamEvent::DocumentStart { page_count: 2, .. })));
        assert!(matches!(events.last(), Some(StreamEvent::DocumentEnd)));

        // Per page: PageStart < ResourceRef < ContentOperation < PageEnd
        let position = |pred: &dyn Fn(&StreamEvent) -> bool| events.iter().position(|e| pred(e));
        let start0 = position(&|e| matches!(e, StreamEvent::PageStart { index: 0, .. })).unwrap();
        let res0 = position(&|e| matches!(e, StreamEvent::ResourceRef { page: 0, .. })).unwrap();
        let op0 = position(&|e| matches!(e, StreamEvent::ContentOperation { page: 0, .. })).unwrap();
        let end0 = position(&|e| matches!(e, StreamEvent::PageEnd { index: 0 })).unwrap();
        assert!(start0 < res0 && res0 < op0 && op0 < end0);
    }

    #[test]
    fn test_page_indices_strictly_monotonic() {
        let events: Vec<StreamEvent> =
            stream_document(sample_doc(), 2, CancelToken::new()).into_iter().collect();
        let starts: Vec<usize> = events
            .iter()
            .filter_map(|e| match e {
                StreamEvent::PageStart { index, .. } => Some(*index),
                _ => None,
            })
            .collect();
        assert_eq!(starts, vec![0, 1]);
    }

    #[test]
    fn test_bounded_buffer_backpressure() {
        // A tiny buffer still delivers everything as long as we consume
        let events: Vec<StreamEvent> =
            stream_document(sample_doc(), 1, CancelToken::new()).into_iter().collect();
        assert!(events.len() > 6);
    }

    #[test]
    fn test_cancelled_emitter_closes_channel() {
        let cancel = CancelToken::new();
        cancel.cancel();
        let events: Vec<StreamEvent> =
            stream_document(sample_doc(), 4, cancel).into_iter().collect();
        // Either nothing or a truncated prefix without DocumentEnd
        assert!(!events.iter().any(|e| matches!(e, StreamEvent::DocumentEnd)));
    }

    #[test]
    fn test_dropped_receiver_stops_producer() {
        let receiver = stream_document(sample_doc(), 1, CancelToken::new());
        drop(receiver);
        // The producer thread exits on the send error; nothing to assert
        // beyond not hanging.
    }
}
