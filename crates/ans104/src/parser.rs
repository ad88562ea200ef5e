//! Streaming ANS-104 data-item parser: walks the byte-exact header state
//! machine, emitting each field the instant it is complete, and passes the
//! payload straight through to a downstream consumer without buffering it.

use std::sync::Arc;

use bytes::Bytes;
use futures::{Stream, StreamExt};
use sha2::{Digest, Sha256};
use tokio::sync::{mpsc, Mutex, Notify};

use turbo_ring_buffer::CircularByteBuffer;

use crate::deep_hash::DeepHashStreamer;
use crate::error::{AnsError, ParseError, SpecViolation, VerificationError};
use crate::sig::{self, SignatureType};
use crate::tags::{self, Tag, MAX_TAGS, MAX_TAG_NAME_LEN, MAX_TAG_VALUE_LEN};

/// Per-call tag-spec enforcement knobs (spec.md `failOnTagsSpecViolation`
/// / `failOnEmptyStringsInTags`).
#[derive(Debug, Clone, Copy)]
pub struct ParseOptions {
    pub fail_on_tags_spec_violation: bool,
    pub fail_on_empty_strings_in_tags: bool,
}

impl Default for ParseOptions {
    fn default() -> Self {
        Self {
            fail_on_tags_spec_violation: true,
            fail_on_empty_strings_in_tags: false,
        }
    }
}

/// The fully-resolved, immutable result of a successful parse.
#[derive(Debug, Clone)]
pub struct ParsedItem {
    pub id: [u8; 32],
    pub signature_type: SignatureType,
    pub signature: Vec<u8>,
    pub owner: Vec<u8>,
    pub target: Option<[u8; 32]>,
    pub anchor: Option<[u8; 32]>,
    pub tags: Vec<Tag>,
    pub payload_data_start: u64,
    pub payload_size: u64,
    pub is_valid: bool,
}

/// Per-field events emitted the instant the corresponding region of the
/// item is fully read, per Design Note 1's tagged-variant event channel.
#[derive(Debug, Clone)]
pub enum ParserEvent {
    SignatureType(SignatureType),
    Signature(Arc<Vec<u8>>),
    Owner(Arc<Vec<u8>>),
    Target(Option<[u8; 32]>),
    Anchor(Option<[u8; 32]>),
    NumTags(u64),
    NumTagsBytes(u64),
    TagsBytes(Arc<Vec<Tag>>),
    PayloadStart(u64),
    PayloadSize(u64),
    IsValid(bool),
    Error(String),
}

#[derive(Default)]
struct HeaderFields {
    signature_type: Option<SignatureType>,
    signature: Option<Arc<Vec<u8>>>,
    owner: Option<Arc<Vec<u8>>>,
    target: Option<Option<[u8; 32]>>,
    anchor: Option<Option<[u8; 32]>>,
    tags: Option<Arc<Vec<Tag>>>,
    payload_data_start: Option<u64>,
    payload_size: Option<u64>,
    is_valid: Option<bool>,
    error: Option<String>,
}

struct Shared {
    fields: Mutex<HeaderFields>,
    notify: Notify,
    events: tokio::sync::broadcast::Sender<ParserEvent>,
}

impl Shared {
    async fn set<T>(&self, set: impl FnOnce(&mut HeaderFields) -> &mut Option<T>, value: T) {
        let mut guard = self.fields.lock().await;
        *set(&mut guard) = Some(value);
        drop(guard);
        self.notify.notify_waiters();
    }

    /// Fans an event out to any subscriber; dropped silently if nobody is
    /// listening, same as a log line nobody tailed.
    fn emit(&self, event: ParserEvent) {
        let _ = self.events.send(event);
    }

    async fn wait_for<T: Clone>(&self, get: impl Fn(&HeaderFields) -> Option<T>) -> Option<T> {
        loop {
            {
                let guard = self.fields.lock().await;
                if let Some(v) = get(&guard) {
                    return Some(v);
                }
                if guard.error.is_some() {
                    return None;
                }
            }
            self.notify.notified().await;
        }
    }
}

/// A lazy, idempotent view onto a single data item being streamed in.
/// Every accessor caches its result on first resolution and is safe to
/// call repeatedly or concurrently.
pub struct ItemHandle {
    shared: Arc<Shared>,
    payload_rx: Mutex<Option<mpsc::Receiver<Bytes>>>,
    result_rx: Mutex<Option<tokio::sync::oneshot::Receiver<Result<ParsedItem, AnsError>>>>,
}

impl ItemHandle {
    pub async fn signature_type(&self) -> Option<SignatureType> {
        self.shared.wait_for(|f| f.signature_type).await
    }

    pub async fn signature(&self) -> Option<Arc<Vec<u8>>> {
        self.shared.wait_for(|f| f.signature.clone()).await
    }

    pub async fn owner(&self) -> Option<Arc<Vec<u8>>> {
        self.shared.wait_for(|f| f.owner.clone()).await
    }

    pub async fn target(&self) -> Option<Option<[u8; 32]>> {
        self.shared.wait_for(|f| f.target).await
    }

    pub async fn anchor(&self) -> Option<Option<[u8; 32]>> {
        self.shared.wait_for(|f| f.anchor).await
    }

    pub async fn tags(&self) -> Option<Arc<Vec<Tag>>> {
        self.shared.wait_for(|f| f.tags.clone()).await
    }

    pub async fn payload_data_start(&self) -> Option<u64> {
        self.shared.wait_for(|f| f.payload_data_start).await
    }

    pub async fn payload_size(&self) -> Option<u64> {
        self.shared.wait_for(|f| f.payload_size).await
    }

    pub async fn is_valid(&self) -> Option<bool> {
        self.shared.wait_for(|f| f.is_valid).await
    }

    /// Takes the payload byte stream. Can only be taken once; the parser
    /// never buffers the whole payload, so this must be drained for the
    /// item to finish parsing.
    pub async fn payload(&self) -> Option<mpsc::Receiver<Bytes>> {
        self.payload_rx.lock().await.take()
    }

    /// Subscribes to the raw event stream underlying the accessors above,
    /// for callers that want to react to fields as they resolve rather
    /// than poll each accessor individually. Events published before this
    /// call is made are not replayed.
    pub fn subscribe(&self) -> tokio::sync::broadcast::Receiver<ParserEvent> {
        self.shared.events.subscribe()
    }

    /// Awaits the fully-resolved, verified item. Resolves once the payload
    /// stream has ended and the signature has been checked.
    pub async fn finish(&self) -> Result<ParsedItem, AnsError> {
        let rx = self.result_rx.lock().await.take();
        match rx {
            Some(rx) => rx
                .await
                .unwrap_or_else(|_| Err(ParseError::Io("parser task dropped".into()).into())),
            None => Err(ParseError::Io("finish() already called".into()).into()),
        }
    }
}

const HEADER_RING_CAPACITY: usize = 2048;

struct ChunkPuller<S> {
    stream: S,
    pending: Option<Bytes>,
}

impl<S> ChunkPuller<S>
where
    S: Stream<Item = std::io::Result<Bytes>> + Unpin,
{
    async fn next_chunk(&mut self) -> Result<Option<Bytes>, ParseError> {
        if let Some(p) = self.pending.take() {
            return Ok(Some(p));
        }
        match self.stream.next().await {
            Some(Ok(b)) if !b.is_empty() => Ok(Some(b)),
            Some(Ok(_)) => Box::pin(self.next_chunk()).await,
            Some(Err(e)) => Err(ParseError::Io(e.to_string())),
            None => Ok(None),
        }
    }

    async fn fill_ring(
        &mut self,
        ring: &mut CircularByteBuffer,
        field: &'static str,
        want: usize,
    ) -> Result<(), ParseError> {
        while ring.used_capacity() < want {
            match self.next_chunk().await? {
                Some(chunk) => {
                    let n = chunk.len().min(ring.remaining_capacity());
                    ring.write_all(&chunk[..n])
                        .map_err(|e| ParseError::Io(e.to_string()))?;
                    if n < chunk.len() {
                        self.pending = Some(chunk.slice(n..));
                    }
                }
                None => {
                    return Err(ParseError::UnexpectedEof {
                        field,
                        wanted: want,
                        got: ring.used_capacity(),
                    })
                }
            }
        }
        Ok(())
    }

    async fn read_exact(
        &mut self,
        ring: &mut CircularByteBuffer,
        field: &'static str,
        n: usize,
    ) -> Result<Vec<u8>, ParseError> {
        self.fill_ring(ring, field, n).await?;
        ring.shift(n).map_err(|e| ParseError::Io(e.to_string()))
    }

    /// Moves whatever the ring already buffered ahead of the current field
    /// back in front of the stream, so switching from ring-backed reads to
    /// [`read_exact_direct`] (or straight payload streaming) doesn't strand
    /// bytes the ring already pulled out of the source stream.
    fn drain_ring_into_pending(&mut self, ring: &mut CircularByteBuffer) -> Result<(), ParseError> {
        let n = ring.used_capacity();
        if n == 0 {
            return Ok(());
        }
        let mut combined = ring.shift(n).map_err(|e| ParseError::Io(e.to_string()))?;
        if let Some(p) = self.pending.take() {
            combined.extend_from_slice(&p);
        }
        self.pending = Some(Bytes::from(combined));
        Ok(())
    }

    /// Reads exactly `n` bytes directly (bypassing the fixed-size ring),
    /// used for the variably-sized `tagsBytes` field.
    async fn read_exact_direct(&mut self, field: &'static str, n: usize) -> Result<Vec<u8>, ParseError> {
        let mut out = Vec::with_capacity(n);
        while out.len() < n {
            match self.next_chunk().await? {
                Some(chunk) => {
                    let want = n - out.len();
                    if chunk.len() <= want {
                        out.extend_from_slice(&chunk);
                    } else {
                        out.extend_from_slice(&chunk[..want]);
                        self.pending = Some(chunk.slice(want..));
                    }
                }
                None => {
                    return Err(ParseError::UnexpectedEof {
                        field,
                        wanted: n,
                        got: out.len(),
                    })
                }
            }
        }
        Ok(out)
    }
}

/// Consumes `input` as the raw bytes of a single ANS-104 data item and
/// returns an [`ItemHandle`] whose accessors resolve as each field
/// becomes available. The payload is streamed through to whoever calls
/// [`ItemHandle::payload`] without ever being buffered whole.
pub fn parse<S>(input: S, opts: ParseOptions) -> ItemHandle
where
    S: Stream<Item = std::io::Result<Bytes>> + Unpin + Send + 'static,
{
    let (events_tx, _) = tokio::sync::broadcast::channel(64);
    let shared = Arc::new(Shared {
        fields: Mutex::new(HeaderFields::default()),
        notify: Notify::new(),
        events: events_tx,
    });
    let (payload_tx, payload_rx) = mpsc::channel::<Bytes>(32);
    let (result_tx, result_rx) = tokio::sync::oneshot::channel();

    let task_shared = shared.clone();
    tokio::spawn(async move {
        let result = drive(input, opts, task_shared.clone(), payload_tx).await;
        if let Err(ref e) = result {
            let mut guard = task_shared.fields.lock().await;
            guard.error = Some(e.to_string());
            drop(guard);
            task_shared.notify.notify_waiters();
            task_shared.emit(ParserEvent::Error(e.to_string()));
        }
        let _ = result_tx.send(result);
    });

    ItemHandle {
        shared,
        payload_rx: Mutex::new(Some(payload_rx)),
        result_rx: Mutex::new(Some(result_rx)),
    }
}

async fn drive<S>(
    input: S,
    opts: ParseOptions,
    shared: Arc<Shared>,
    payload_tx: mpsc::Sender<Bytes>,
) -> Result<ParsedItem, AnsError>
where
    S: Stream<Item = std::io::Result<Bytes>> + Unpin,
{
    let mut puller = ChunkPuller {
        stream: input,
        pending: None,
    };
    let mut ring = CircularByteBuffer::new(HEADER_RING_CAPACITY)
        .expect("fixed positive capacity");

    let mut raw_header_len = 0u64;

    let sig_type_bytes = puller.read_exact(&mut ring, "signatureType", 2).await?;
    raw_header_len += 2;
    let sig_type_value = u16::from_le_bytes([sig_type_bytes[0], sig_type_bytes[1]]);
    let sig_type = SignatureType::from_u16(sig_type_value)?;
    shared.set(|f| &mut f.signature_type, sig_type).await;
    shared.emit(ParserEvent::SignatureType(sig_type));

    let signature = puller
        .read_exact(&mut ring, "signature", sig_type.sig_len())
        .await?;
    raw_header_len += signature.len() as u64;
    let signature = Arc::new(signature);
    shared.set(|f| &mut f.signature, signature.clone()).await;
    shared.emit(ParserEvent::Signature(signature.clone()));

    let owner = puller
        .read_exact(&mut ring, "owner", sig_type.pubkey_len())
        .await?;
    raw_header_len += owner.len() as u64;
    let owner = Arc::new(owner);
    shared.set(|f| &mut f.owner, owner.clone()).await;
    shared.emit(ParserEvent::Owner(owner.clone()));

    let target_flag = puller.read_exact(&mut ring, "targetFlag", 1).await?[0];
    raw_header_len += 1;
    let target = match target_flag {
        0 => None,
        1 => {
            let bytes = puller.read_exact(&mut ring, "target", 32).await?;
            raw_header_len += 32;
            Some(bytes.try_into().unwrap())
        }
        other => return Err(ParseError::InvalidPresenceFlag(other).into()),
    };
    shared.set(|f| &mut f.target, target).await;
    shared.emit(ParserEvent::Target(target));

    let anchor_flag = puller.read_exact(&mut ring, "anchorFlag", 1).await?[0];
    raw_header_len += 1;
    let anchor = match anchor_flag {
        0 => None,
        1 => {
            let bytes = puller.read_exact(&mut ring, "anchor", 32).await?;
            raw_header_len += 32;
            Some(bytes.try_into().unwrap())
        }
        other => return Err(ParseError::InvalidPresenceFlag(other).into()),
    };
    shared.set(|f| &mut f.anchor, anchor).await;
    shared.emit(ParserEvent::Anchor(anchor));

    let num_tags_raw = puller.read_exact(&mut ring, "numTags", 8).await?;
    raw_header_len += 8;
    let num_tags = u64::from_le_bytes(num_tags_raw.try_into().unwrap());
    let mut tag_violation = None;
    if num_tags as usize > MAX_TAGS {
        let violation = SpecViolation::TooManyTags(num_tags as usize);
        if opts.fail_on_tags_spec_violation {
            return Err(violation.into());
        }
        tracing::warn!(%violation, "ANS-104 tag spec violation (non-fatal per ParseOptions)");
        tag_violation = Some(violation);
    }
    shared.emit(ParserEvent::NumTags(num_tags));

    let num_tags_bytes_raw = puller.read_exact(&mut ring, "numTagsBytes", 8).await?;
    raw_header_len += 8;
    let num_tags_bytes = u64::from_le_bytes(num_tags_bytes_raw.try_into().unwrap());
    shared.emit(ParserEvent::NumTagsBytes(num_tags_bytes));

    puller.drain_ring_into_pending(&mut ring)?;
    let tags_bytes = if num_tags_bytes > 0 {
        puller
            .read_exact_direct("tagsBytes", num_tags_bytes as usize)
            .await?
    } else {
        Vec::new()
    };
    raw_header_len += tags_bytes.len() as u64;

    let tags = tags::decode_tags(&tags_bytes)?;
    if tags.len() != num_tags as usize {
        return Err(ParseError::InvalidTagEncoding(format!(
            "declared numTags={num_tags} but decoded {} tags",
            tags.len()
        ))
        .into());
    }
    for tag in &tags {
        if tag.name.len() > MAX_TAG_NAME_LEN {
            tag_violation = Some(SpecViolation::NameTooLong(tag.name.len()));
            break;
        }
        if tag.value.len() > MAX_TAG_VALUE_LEN {
            tag_violation = Some(SpecViolation::ValueTooLong(tag.value.len()));
            break;
        }
        if opts.fail_on_empty_strings_in_tags && (tag.name.is_empty() || tag.value.is_empty()) {
            tag_violation = Some(SpecViolation::EmptyTagString);
            break;
        }
    }
    if let Some(violation) = &tag_violation {
        if opts.fail_on_tags_spec_violation {
            return Err(violation.clone().into());
        }
        tracing::warn!(%violation, "ANS-104 tag spec violation (non-fatal per ParseOptions)");
    }
    let tags = Arc::new(tags);
    shared.set(|f| &mut f.tags, tags.clone()).await;
    shared.emit(ParserEvent::TagsBytes(tags.clone()));

    let payload_data_start = raw_header_len;
    shared
        .set(|f| &mut f.payload_data_start, payload_data_start)
        .await;
    shared.emit(ParserEvent::PayloadStart(payload_data_start));

    let sig_type_str = sig_type.as_u16().to_string();
    let header_blobs: Vec<&[u8]> = vec![
        b"dataitem",
        b"1",
        sig_type_str.as_bytes(),
        &owner,
        target.as_ref().map(|a| a.as_slice()).unwrap_or(&[]),
        anchor.as_ref().map(|a| a.as_slice()).unwrap_or(&[]),
        &tags_bytes,
    ];
    let mut deep_hash = DeepHashStreamer::new(&header_blobs);

    loop {
        match puller.next_chunk().await {
            Ok(Some(chunk)) => {
                deep_hash.update_payload(&chunk);
                if payload_tx.send(chunk).await.is_err() {
                    return Err(ParseError::Io("payload consumer dropped".into()).into());
                }
            }
            Ok(None) => break,
            Err(e) => return Err(e.into()),
        }
    }
    let payload_size = deep_hash.payload_len();
    shared.set(|f| &mut f.payload_size, payload_size).await;
    shared.emit(ParserEvent::PayloadSize(payload_size));

    let digest = deep_hash.finalize();
    let signature_valid = match sig::verify(sig_type, &owner, &signature, &digest) {
        Ok(ok) => ok,
        Err(VerificationError::MalformedKey(_)) => false,
        Err(e) => return Err(e.into()),
    };
    let is_valid = signature_valid && tag_violation.is_none();
    shared.set(|f| &mut f.is_valid, is_valid).await;
    shared.emit(ParserEvent::IsValid(is_valid));

    let id: [u8; 32] = Sha256::digest(signature.as_slice()).into();

    Ok(ParsedItem {
        id,
        signature_type: sig_type,
        signature: (*signature).clone(),
        owner: (*owner).clone(),
        target,
        anchor,
        tags: (*tags).clone(),
        payload_data_start,
        payload_size,
        is_valid,
    })
}
