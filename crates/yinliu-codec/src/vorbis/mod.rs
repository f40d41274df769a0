//! Vorbis I 音频解码器.
//!
//! 解码流程:
//! - 三个头包 (identification/comment/setup) 解析为只读的码流配置
//! - 每个音频包: floor 解码, residue 重建, 声道解耦, 逆 MDCT, 加窗重叠相加
//! - 输出阶段按请求的布局与采样格式拷出样本
//!
//! 结构性错误是致命的, 解码器随即锁定; 音频包在 floor/residue 中途结束则按静音处理.

mod bitreader;
mod codebook;
mod dsp;
mod floor;
mod headers;
mod imdct;
mod output;
mod residue;
mod setup;
mod synthesis;

use std::fmt;

use log::{debug, trace, warn};
use yinliu_core::{ChannelLayout, CorruptKind, YinliuError, YinliuResult};

use crate::packet::PacketSource;

use self::bitreader::{BitReader, ilog};
use self::floor::DecodedFloor;
use self::headers::{IDENTIFICATION_LEN, IdentificationHeader, parse_identification_header};
use self::imdct::build_kernel;
use self::output::interleave;
use self::residue::{ResidueKind, ResidueScratch};
use self::setup::{Setup, parse_setup_packet};
use self::synthesis::{BlockBuffer, Synthesizer};

pub use self::dsp::{DspKernels, KernelKind};
pub use self::imdct::{DirectImdct, FftImdct, ImdctKernel, TransformKind};
pub use self::output::{OutputLayout, OutputSample};

/// 解码器选项
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct VorbisDecoderOptions {
    /// 逆 MDCT 内核
    pub transform: TransformKind,
    /// 内层循环实现
    pub kernels: KernelKind,
}

/// 当前 packet 已合成、尚未读出的样本
#[derive(Debug, Clone, Copy, Default)]
struct OutputCursor {
    start: usize,
    len: usize,
    pos: usize,
}

impl OutputCursor {
    fn remaining(&self) -> usize {
        self.len - self.pos
    }
}

/// 头包解析后才存在的码流状态
struct StreamState {
    ident: IdentificationHeader,
    setup: Setup,
    short_kernel: Box<dyn ImdctKernel + Send>,
    long_kernel: Box<dyn ImdctKernel + Send>,
    synth: Synthesizer,
    buffers: Vec<BlockBuffer>,
    floors: Vec<DecodedFloor>,
    floor_valid: Vec<bool>,
    no_residue: Vec<bool>,
    residue_scratch: ResidueScratch,
    output: OutputCursor,
    sample_counter: u64,
}

/// Vorbis 解码器
///
/// 从 [`PacketSource`] 拉取 packet. 先调用 [`VorbisDecoder::parse_headers`],
/// 之后循环调用 [`VorbisDecoder::decode_audio_packet`] 并读出样本.
pub struct VorbisDecoder<S: PacketSource> {
    source: S,
    options: VorbisDecoderOptions,
    kernels: &'static DspKernels,
    stream: Option<Box<StreamState>>,
    failed: bool,
    interleaved: Vec<f32>,
}

impl<S: PacketSource> fmt::Debug for VorbisDecoder<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VorbisDecoder")
            .field("options", &self.options)
            .field("kernels", &self.kernels.name)
            .field("headers_parsed", &self.stream.is_some())
            .field("sample_rate", &self.sample_rate())
            .field("channels", &self.channel_count())
            .field("failed", &self.failed)
            .finish()
    }
}

impl<S: PacketSource> VorbisDecoder<S> {
    pub fn new(source: S) -> Self {
        Self::with_options(source, VorbisDecoderOptions::default())
    }

    pub fn with_options(source: S, options: VorbisDecoderOptions) -> Self {
        Self {
            source,
            options,
            kernels: DspKernels::for_kind(options.kernels),
            stream: None,
            failed: false,
            interleaved: Vec::new(),
        }
    }

    pub fn options(&self) -> VorbisDecoderOptions {
        self.options
    }

    /// 实际使用的内层循环实现
    pub fn kernels(&self) -> &'static DspKernels {
        self.kernels
    }

    fn ensure_usable(&self) -> YinliuResult<()> {
        if self.failed {
            return Err(YinliuError::InvalidArgument(
                "Vorbis 解码器已因致命错误停止".into(),
            ));
        }
        Ok(())
    }

    /// 依次解析 identification、comment、setup 三个头包
    pub fn parse_headers(&mut self) -> YinliuResult<()> {
        self.ensure_usable()?;
        if self.stream.is_some() {
            return Err(YinliuError::InvalidArgument("Vorbis 头包已解析".into()));
        }
        match self.read_headers() {
            Ok(stream) => {
                self.stream = Some(Box::new(stream));
                Ok(())
            }
            Err(e) => {
                self.failed = true;
                Err(e)
            }
        }
    }

    fn read_headers(&mut self) -> YinliuResult<StreamState> {
        next_header_packet(&mut self.source, "identification")?;
        let mut packet = [0u8; IDENTIFICATION_LEN];
        let len = read_full(&mut self.source, &mut packet)?;
        let ident = parse_identification_header(&packet[..len])?;

        // comment 头包内容不参与解码
        next_header_packet(&mut self.source, "comment")?;

        next_header_packet(&mut self.source, "setup")?;
        let mut br = BitReader::new(&mut self.source);
        let result = parse_setup_packet(&mut br, ident.channels);
        br.finish()?;
        let setup = result?;

        let channels = usize::from(ident.channels);
        let short = ident.short_block_size();
        let long = ident.long_block_size();
        debug!(
            "Vorbis 头包解析完成: sample_rate={}, channels={}, blocks={}/{}, bitrate_nominal={}, transform={:?}",
            ident.sample_rate, channels, short, long, ident.bitrate_nominal, self.options.transform
        );

        Ok(StreamState {
            ident,
            setup,
            short_kernel: build_kernel(self.options.transform, short / 2),
            long_kernel: build_kernel(self.options.transform, long / 2),
            synth: Synthesizer::new(channels, short, long),
            buffers: vec![BlockBuffer::new(long / 2); channels],
            floors: vec![DecodedFloor::default(); channels],
            floor_valid: vec![false; channels],
            no_residue: vec![false; channels],
            residue_scratch: ResidueScratch::default(),
            output: OutputCursor::default(),
            sample_counter: 0,
        })
    }

    /// 解码下一个音频包
    ///
    /// 返回 `false` 表示码流结束. 返回 `true` 后可能有 0 个可读样本
    /// (第一个块, 或在 floor 之前就结束而被丢弃的 packet).
    pub fn decode_audio_packet(&mut self) -> YinliuResult<bool> {
        self.ensure_usable()?;
        let Some(stream) = self.stream.as_deref_mut() else {
            return Err(YinliuError::InvalidArgument(
                "Vorbis 头包尚未解析".into(),
            ));
        };
        let result = stream.decode_packet(&mut self.source, self.kernels);
        if result.is_err() {
            self.failed = true;
        }
        result
    }

    /// 当前 packet 尚未读出的帧数
    pub fn samples_remaining(&self) -> usize {
        self.stream.as_ref().map_or(0, |s| s.output.remaining())
    }

    /// 读出至多 `dst.len() / 声道数` 帧, 返回写入的帧数
    pub fn read_samples<T: OutputSample>(&mut self, layout: OutputLayout, dst: &mut [T]) -> usize {
        let Some(stream) = self.stream.as_deref_mut() else {
            return 0;
        };
        let width = layout.output_channels(stream.buffers.len());
        let frames = (dst.len() / width).min(stream.output.remaining());
        if frames == 0 {
            return 0;
        }

        let start = stream.output.start + stream.output.pos;
        let range = start..start + frames;
        let first = stream.buffers[0].samples(range.clone());
        let views = [
            first,
            stream.buffers.get(1).map_or(first, |b| b.samples(range)),
        ];
        interleave(&views[..stream.buffers.len()], layout, frames, &mut self.interleaved);
        T::convert(&self.interleaved, &mut dst[..frames * width], self.kernels);

        stream.output.pos += frames;
        frames
    }

    /// 丢弃至多 `n` 帧, 返回实际丢弃的帧数
    pub fn consume_samples(&mut self, n: usize) -> usize {
        let Some(stream) = self.stream.as_deref_mut() else {
            return 0;
        };
        let n = n.min(stream.output.remaining());
        stream.output.pos += n;
        n
    }

    /// 采样率, 头包解析前为 0
    pub fn sample_rate(&self) -> u32 {
        self.stream.as_ref().map_or(0, |s| s.ident.sample_rate)
    }

    /// 声道数, 头包解析前为 0
    pub fn channel_count(&self) -> usize {
        self.stream.as_ref().map_or(0, |s| usize::from(s.ident.channels))
    }

    pub fn channel_layout(&self) -> Option<ChannelLayout> {
        self.stream.as_ref().map(|s| s.ident.channel_layout())
    }

    /// (短块, 长块) 长度, 头包解析前为 (0, 0)
    pub fn block_sizes(&self) -> (usize, usize) {
        self.stream.as_ref().map_or((0, 0), |s| {
            (s.ident.short_block_size(), s.ident.long_block_size())
        })
    }

    /// 累计合成的帧数, 包含已读出和已丢弃的部分
    pub fn sample_counter(&self) -> u64 {
        self.stream.as_ref().map_or(0, |s| s.sample_counter)
    }

    pub fn into_inner(self) -> S {
        self.source
    }
}

fn next_header_packet(source: &mut dyn PacketSource, name: &str) -> YinliuResult<()> {
    if !source.next_packet()? {
        return Err(YinliuError::corrupt(
            CorruptKind::TruncatedHeader,
            format!("Vorbis 缺少 {name} 头包"),
        ));
    }
    Ok(())
}

/// 尽量填满 `buf`, 返回读到的字节数
fn read_full(source: &mut dyn PacketSource, buf: &mut [u8]) -> YinliuResult<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        let n = source.read_packet_data(&mut buf[filled..])?;
        if n == 0 {
            break;
        }
        filled += n;
    }
    Ok(filled)
}

fn pair_mut<T>(items: &mut [T], a: usize, b: usize) -> (&mut T, &mut T) {
    debug_assert_ne!(a, b);
    if a < b {
        let (lo, hi) = items.split_at_mut(b);
        (&mut lo[a], &mut hi[0])
    } else {
        let (lo, hi) = items.split_at_mut(a);
        (&mut hi[0], &mut lo[b])
    }
}

impl StreamState {
    fn decode_packet(
        &mut self,
        source: &mut dyn PacketSource,
        kernels: &DspKernels,
    ) -> YinliuResult<bool> {
        if !source.next_packet()? {
            return Ok(false);
        }
        let mut br = BitReader::new(source);
        let result = self.decode_body(&mut br, kernels);
        br.finish()?;
        result?;
        Ok(true)
    }

    fn decode_body(&mut self, br: &mut BitReader<'_>, kernels: &DspKernels) -> YinliuResult<()> {
        let Self {
            setup,
            short_kernel,
            long_kernel,
            synth,
            buffers,
            floors,
            floor_valid,
            no_residue,
            residue_scratch,
            ..
        } = self;

        // 首位与 mode 范围先于 packet 末尾检查, 非法值总是致命
        if br.read_flag() {
            return Err(YinliuError::corrupt(
                CorruptKind::InvalidField,
                "Vorbis 音频包首位必须为 0",
            ));
        }
        let mode_bits = ilog(setup.modes.len() as u32 - 1);
        let mode_number = br.read(mode_bits) as usize;
        let Some(&mode) = setup.modes.get(mode_number) else {
            return Err(YinliuError::corrupt(
                CorruptKind::BadReference,
                format!("Vorbis mode 索引越界: {mode_number} >= {}", setup.modes.len()),
            ));
        };
        if br.is_eop() {
            warn!("Vorbis 音频包在读取 mode 时结束, 丢弃");
            return Ok(());
        }

        let long = mode.long_block;
        if long {
            // 前后窗标志, 窗形由相邻块的实际长度决定
            let _prev_window = br.read_flag();
            let _next_window = br.read_flag();
        }
        if br.is_eop() {
            warn!("Vorbis 音频包在 floor 之前结束, 丢弃");
            return Ok(());
        }

        let half = synth.half_size(long);
        let mapping = &setup.mappings[usize::from(mode.mapping)];
        let submap_of = |ch: usize| mapping.submaps[usize::from(mapping.mux[ch])];

        for (ch, decoded) in floors.iter_mut().enumerate() {
            let floor = &setup.floors[usize::from(submap_of(ch).floor)];
            floor_valid[ch] = floor.decode(br, &setup.codebooks, decoded)?;
        }
        if br.is_eop() {
            floor_valid.fill(false);
        }

        for (skip, &valid) in no_residue.iter_mut().zip(floor_valid.iter()) {
            *skip = !valid;
        }
        // 耦合的两个声道必须一起解码 residue
        for &(m, a) in &mapping.coupling {
            let (m, a) = (usize::from(m), usize::from(a));
            if !(no_residue[m] && no_residue[a]) {
                no_residue[m] = false;
                no_residue[a] = false;
            }
        }

        for buf in buffers.iter_mut() {
            buf.active_mut(half).fill(0.0);
        }
        for (index, submap) in mapping.submaps.iter().enumerate() {
            let residue = &setup.residues[usize::from(submap.residue)];
            let keep_skipped = residue.kind() == ResidueKind::ChannelInterleaved;
            let mut any_decoded = false;
            let mut vectors: Vec<&mut [f32]> = Vec::with_capacity(buffers.len());
            for (ch, buf) in buffers.iter_mut().enumerate() {
                if usize::from(mapping.mux[ch]) != index {
                    continue;
                }
                any_decoded |= !no_residue[ch];
                if keep_skipped || !no_residue[ch] {
                    vectors.push(buf.active_mut(half));
                }
            }
            if !any_decoded {
                continue;
            }
            residue.decode(
                br,
                &setup.codebooks,
                &mut vectors,
                half,
                residue_scratch,
                kernels,
            )?;
        }

        for &(m, a) in mapping.coupling.iter().rev() {
            let (magnitude, angle) = pair_mut(buffers, usize::from(m), usize::from(a));
            (kernels.decouple)(magnitude.active_mut(half), angle.active_mut(half));
        }

        let kernel = if long { long_kernel } else { short_kernel };
        for (ch, buf) in buffers.iter_mut().enumerate() {
            let active = buf.active_mut(half);
            if !floor_valid[ch] {
                active.fill(0.0);
                continue;
            }
            let floor = &setup.floors[usize::from(submap_of(ch).floor)];
            floor.render(&floors[ch], active);
            kernel.transform(active);
        }

        let span = synth.overlap(buffers, long, kernels);
        self.output = OutputCursor {
            start: span.start,
            len: span.len,
            pos: 0,
        };
        self.sample_counter += span.len as u64;
        trace!(
            "Vorbis 音频包: mode={mode_number}, long={long}, half={half}, samples={}",
            span.len
        );
        Ok(())
    }
}
