//! Chunking-invariance and round-trip properties of the packet parser

use h4_tokio::common::AllocClass;
use h4_tokio::parser::{ParseStep, Parser};
use h4_tokio::Classification;

/// Drive the parser over `stream` as if bytes arrived `chunk` at a time,
/// skipping each packet's payload the way the receive path streams it into
/// its destination buffer.
fn classify_stream(stream: &[u8], chunk: usize) -> Vec<Classification> {
    let mut parser = Parser::new(false);
    let mut out = Vec::new();
    let mut buffered: Vec<u8> = Vec::new();
    let mut skip = 0usize;

    for piece in stream.chunks(chunk) {
        buffered.extend_from_slice(piece);

        loop {
            if skip > 0 {
                let n = skip.min(buffered.len());
                buffered.drain(..n);
                skip -= n;
                if skip > 0 {
                    break;
                }
            }
            if buffered.is_empty() {
                break;
            }

            let mut window: &[u8] = &buffered;
            let before = window.len();
            let step = parser.feed(&mut window);
            let consumed = before - window.len();
            buffered.drain(..consumed);

            match step {
                ParseStep::NeedMore(_) => break,
                ParseStep::Classified(c) => {
                    out.push(c);
                    skip = c.remaining();
                    parser.reset();
                }
                ParseStep::Fatal(err) => panic!("unexpected parse failure: {err}"),
            }
        }
    }

    out
}

fn sample_stream() -> Vec<u8> {
    let mut stream = Vec::new();
    // Command Complete, opcode 0x0c03
    stream.extend_from_slice(&[0x04, 0x0e, 0x04, 0x01, 0x03, 0x0c, 0x00]);
    // LE advertising report
    stream.extend_from_slice(&[0x04, 0x3e, 0x02, 0x02, 0x00]);
    // ACL, handle 0x0010, 5 payload bytes
    stream.extend_from_slice(&[0x02, 0x10, 0x00, 0x05, 0x00, 0xaa, 0xbb, 0xcc, 0xdd, 0xee]);
    // Number Of Completed Packets, one handle
    stream.extend_from_slice(&[0x04, 0x13, 0x05, 0x01, 0x10, 0x00, 0x01, 0x00]);
    // Disconnection Complete (generic)
    stream.extend_from_slice(&[0x04, 0x05, 0x04, 0x00, 0x10, 0x00, 0x13]);
    // Command Status, opcode 0x200d
    stream.extend_from_slice(&[0x04, 0x0f, 0x04, 0x00, 0x01, 0x0d, 0x20]);
    stream
}

#[test]
fn chunk_size_does_not_change_classification() {
    let stream = sample_stream();
    let reference = classify_stream(&stream, stream.len());

    assert_eq!(reference.len(), 6);
    assert_eq!(
        reference[0].class,
        AllocClass::CommandComplete { opcode: 0x0c03 }
    );
    assert_eq!(reference[1].class, AllocClass::LeMetaDiscardable);
    assert_eq!(reference[2].class, AllocClass::AclInbound);
    assert_eq!(reference[3].class, AllocClass::NumCompletedPackets);
    assert_eq!(reference[4].class, AllocClass::GenericEvent);
    assert_eq!(
        reference[5].class,
        AllocClass::CommandStatus { opcode: 0x200d }
    );

    for chunk in [1, 2, 3, 4, 5, 7, 11] {
        assert_eq!(
            classify_stream(&stream, chunk),
            reference,
            "chunk size {chunk}"
        );
    }
}

#[test]
fn classified_lengths_tile_the_stream_exactly() {
    let stream = sample_stream();
    let classifications = classify_stream(&stream, 1);
    let total: usize = classifications.iter().map(|c| c.total_len).sum();
    assert_eq!(total, stream.len());
}

#[test]
fn prefix_plus_remainder_round_trips() {
    let packets: [&[u8]; 4] = [
        &[0x04, 0x0e, 0x04, 0x01, 0x03, 0x0c, 0x00],
        &[0x04, 0x3e, 0x02, 0x02, 0x00],
        &[0x02, 0x10, 0x00, 0x05, 0x00, 0xaa, 0xbb, 0xcc, 0xdd, 0xee],
        &[0x04, 0x13, 0x05, 0x01, 0x10, 0x00, 0x01, 0x00],
    ];

    for packet in packets {
        let mut parser = Parser::new(false);
        let mut buf = packet;
        let c = match parser.feed(&mut buf) {
            ParseStep::Classified(c) => c,
            other => panic!("expected classification, got {other:?}"),
        };

        // No byte duplicated or dropped at the prefix/remainder boundary.
        let mut rebuilt = parser.prefix().to_vec();
        rebuilt.extend_from_slice(&packet[c.consumed..]);
        assert_eq!(rebuilt, packet);
        assert_eq!(c.remaining(), packet.len() - c.consumed);
    }
}
