//! Ogg 容器到 PCM 的端到端测试.

mod common;

use std::io::Cursor;

use common::{LONG_BLOCK, SHORT_BLOCK, expected_frames, ogg_stream, stream_packets};
use yinliu::codec::{MemoryPacketSource, OutputLayout, PacketSource, VorbisDecoder, VorbisDecoderOptions};
use yinliu::core::{CorruptKind, YinliuError, YinliuResult};
use yinliu::format::{OggPacketReader, OggReaderOptions};

const BLOCKS: [bool; 6] = [true, false, false, true, true, false];

fn decode_all<S: PacketSource>(decoder: &mut VorbisDecoder<S>) -> YinliuResult<Vec<f32>> {
    let mut samples = Vec::new();
    let mut buf = vec![0f32; 1024];
    while decoder.decode_audio_packet()? {
        loop {
            let n = decoder.read_samples(OutputLayout::Native, &mut buf);
            if n == 0 {
                break;
            }
            samples.extend_from_slice(&buf[..n * decoder.channel_count()]);
        }
    }
    Ok(samples)
}

fn reference_samples() -> Vec<f32> {
    let mut decoder = VorbisDecoder::new(MemoryPacketSource::new(stream_packets(2, &BLOCKS)));
    decoder.parse_headers().expect("头包解析失败");
    decode_all(&mut decoder).expect("解码失败")
}

#[test]
fn test_ogg_端到端_与内存来源一致() {
    let data = ogg_stream(&stream_packets(2, &BLOCKS), 255);
    let mut decoder = yinliu::open_ogg_vorbis(Cursor::new(data)).expect("打开失败");
    assert_eq!(decoder.block_sizes(), (SHORT_BLOCK, LONG_BLOCK));

    let samples = decode_all(&mut decoder).expect("解码失败");
    let frames: usize = expected_frames(&BLOCKS).iter().sum();
    assert_eq!(samples.len(), frames * 2);
    assert_eq!(samples, reference_samples());
}

#[test]
fn test_ogg_packet跨页() {
    // 每页只有 2 个段, 大部分 packet 都会跨页
    let data = ogg_stream(&stream_packets(2, &BLOCKS), 2);
    let mut decoder = yinliu::open_ogg_vorbis(Cursor::new(data)).expect("打开失败");
    let samples = decode_all(&mut decoder).expect("解码失败");
    assert_eq!(samples, reference_samples());

    let reader = decoder.into_inner();
    assert!(reader.pages_read() > BLOCKS.len() as u64);
}

#[test]
fn test_ogg_crc_损坏() {
    let mut data = ogg_stream(&stream_packets(2, &BLOCKS), 4);
    // 最后一页的粒度位置不参与解码, 只影响校验和
    let last = data
        .windows(4)
        .rposition(|w| w == b"OggS")
        .expect("找不到最后一页");
    data[last + 6] ^= 0xFF;

    let mut decoder = yinliu::open_ogg_vorbis(Cursor::new(data.clone())).expect("打开失败");
    let err = decode_all(&mut decoder).unwrap_err();
    assert_eq!(err.corrupt_kind(), Some(CorruptKind::Checksum));

    let options = OggReaderOptions { verify_crc: false };
    let mut decoder =
        yinliu::open_ogg_vorbis_with(Cursor::new(data), options, VorbisDecoderOptions::default())
            .expect("打开失败");
    let samples = decode_all(&mut decoder).expect("关闭校验后应能解码");
    assert_eq!(samples, reference_samples());
}

#[test]
fn test_ogg_流在页面边界结束() {
    let mut data = ogg_stream(&stream_packets(2, &BLOCKS), 2);
    let last = data
        .windows(4)
        .rposition(|w| w == b"OggS")
        .expect("找不到最后一页");
    data.truncate(last);
    let mut decoder = yinliu::open_ogg_vorbis(Cursor::new(data)).expect("打开失败");
    let samples = decode_all(&mut decoder).expect("缺少末页应视为流结束");

    // 末页只含最后一个 packet 的填充或整个 packet, 已输出部分与完整码流一致
    let reference = reference_samples();
    assert!(samples.len() <= reference.len());
    assert_eq!(samples[..], reference[..samples.len()]);
}

#[test]
fn test_ogg_页面数据截断() {
    // 每页 4 个段, 头包都在前两页
    let mut data = ogg_stream(&stream_packets(2, &BLOCKS), 4);
    data.truncate(data.len() - 10);
    let mut decoder = yinliu::open_ogg_vorbis(Cursor::new(data)).expect("打开失败");
    let err = decode_all(&mut decoder).unwrap_err();
    assert!(matches!(err, YinliuError::Io(_)), "实际错误: {err}");
}

#[test]
fn test_ogg_缺少头包() {
    let packets = stream_packets(2, &BLOCKS);
    let data = ogg_stream(&packets[..2], 255);
    let err = yinliu::open_ogg_vorbis(Cursor::new(data)).unwrap_err();
    assert_eq!(err.corrupt_kind(), Some(CorruptKind::TruncatedHeader));

    let source = OggPacketReader::new(Cursor::new(Vec::new()));
    let mut decoder = VorbisDecoder::new(source);
    assert!(decoder.parse_headers().is_err());
}
