use log::debug;
use yinliu_core::{CorruptKind, YinliuError, YinliuResult};

use super::bitreader::{BitReader, ilog};
use super::codebook::Codebook;
use super::floor::Floor;
use super::residue::Residue;

const SETUP_PACKET_TYPE: u32 = 0x05;

/// 一个 submap 使用的 floor 与 residue
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Submap {
    pub(crate) floor: u8,
    pub(crate) residue: u8,
}

#[derive(Debug, Clone)]
pub(crate) struct Mapping {
    /// 每个声道所属的 submap
    pub(crate) mux: Vec<u8>,
    pub(crate) submaps: Vec<Submap>,
    /// (幅度声道, 角度声道), 按声明顺序
    pub(crate) coupling: Vec<(u8, u8)>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Mode {
    pub(crate) long_block: bool,
    pub(crate) mapping: u8,
}

/// setup 头包解析结果, 整条码流只读共享
#[derive(Debug, Clone)]
pub(crate) struct Setup {
    pub(crate) codebooks: Vec<Codebook>,
    pub(crate) floors: Vec<Floor>,
    pub(crate) residues: Vec<Residue>,
    pub(crate) mappings: Vec<Mapping>,
    pub(crate) modes: Vec<Mode>,
}

/// 解析 setup 头包
///
/// 所有段落必须完整出现, 任何段落内越过 packet 末尾都按头包截断处理.
pub(crate) fn parse_setup_packet(br: &mut BitReader<'_>, channels: u8) -> YinliuResult<Setup> {
    let packet_type = br.read(8);
    let mut magic = [0u8; 6];
    for b in &mut magic {
        *b = br.read(8) as u8;
    }
    if br.is_eop() {
        return Err(YinliuError::corrupt(
            CorruptKind::TruncatedHeader,
            "Vorbis setup 头包长度不足",
        ));
    }
    if packet_type != SETUP_PACKET_TYPE || &magic != b"vorbis" {
        return Err(YinliuError::corrupt(
            CorruptKind::Signature,
            "Vorbis setup 头包标识无效",
        ));
    }

    let result = parse_codebooks(br);
    let codebooks = finish_section(br, "codebooks", result)?;
    let result = parse_time_domain_transforms(br);
    finish_section(br, "time", result)?;
    let result = parse_floors(br, &codebooks);
    let floors = finish_section(br, "floors", result)?;
    let result = parse_residues(br, &codebooks);
    let residues = finish_section(br, "residues", result)?;
    let result = parse_mappings(br, channels, floors.len(), residues.len());
    let mappings = finish_section(br, "mappings", result)?;
    let result = parse_modes(br, mappings.len());
    let modes = finish_section(br, "modes", result)?;

    let framing_flag = br.read_flag();
    if br.is_eop() {
        return Err(YinliuError::corrupt(
            CorruptKind::TruncatedHeader,
            "Vorbis setup 头包缺少 framing_flag",
        ));
    }
    if !framing_flag {
        return Err(YinliuError::corrupt(
            CorruptKind::InvalidField,
            "Vorbis setup 头包 framing_flag 非法",
        ));
    }

    debug!(
        "Vorbis setup: codebooks={}, floors={}, residues={}, mappings={}, modes={}",
        codebooks.len(),
        floors.len(),
        residues.len(),
        mappings.len(),
        modes.len()
    );

    Ok(Setup {
        codebooks,
        floors,
        residues,
        mappings,
        modes,
    })
}

/// 给段落错误补上位置信息, 并把段落内的 EOP 统一为头包截断
fn finish_section<T>(
    br: &BitReader<'_>,
    section: &str,
    result: YinliuResult<T>,
) -> YinliuResult<T> {
    let bit = br.bit_position();
    match result {
        Ok(_) | Err(YinliuError::Corrupt { .. } | YinliuError::Unsupported(_)) if br.is_eop() => {
            Err(YinliuError::corrupt(
                CorruptKind::TruncatedHeader,
                format!("Vorbis setup {section} 段落不完整(bit={bit})"),
            ))
        }
        Ok(v) => Ok(v),
        Err(YinliuError::Corrupt { kind, detail }) => Err(YinliuError::corrupt(
            kind,
            format!("Vorbis setup {section} 解析失败(bit={bit}): {detail}"),
        )),
        Err(YinliuError::Unsupported(detail)) => Err(YinliuError::Unsupported(format!(
            "Vorbis setup {section}(bit={bit}): {detail}"
        ))),
        Err(e) => Err(e),
    }
}

fn parse_codebooks(br: &mut BitReader<'_>) -> YinliuResult<Vec<Codebook>> {
    let count = br.read(8) + 1;
    let mut codebooks = Vec::with_capacity(count as usize);
    for _ in 0..count {
        codebooks.push(Codebook::parse(br)?);
        if br.is_eop() {
            break;
        }
    }
    Ok(codebooks)
}

fn parse_time_domain_transforms(br: &mut BitReader<'_>) -> YinliuResult<()> {
    let count = br.read(6) + 1;
    for _ in 0..count {
        let value = br.read(16);
        if value != 0 {
            return Err(YinliuError::corrupt(
                CorruptKind::ReservedBits,
                format!("Vorbis time domain transform 必须为 0: {value}"),
            ));
        }
    }
    Ok(())
}

fn parse_floors(br: &mut BitReader<'_>, codebooks: &[Codebook]) -> YinliuResult<Vec<Floor>> {
    let count = br.read(6) + 1;
    (0..count).map(|_| Floor::parse(br, codebooks)).collect()
}

fn parse_residues(br: &mut BitReader<'_>, codebooks: &[Codebook]) -> YinliuResult<Vec<Residue>> {
    let count = br.read(6) + 1;
    (0..count).map(|_| Residue::parse(br, codebooks)).collect()
}

fn parse_mappings(
    br: &mut BitReader<'_>,
    channels: u8,
    floor_count: usize,
    residue_count: usize,
) -> YinliuResult<Vec<Mapping>> {
    let count = br.read(6) + 1;
    let mut mappings = Vec::with_capacity(count as usize);
    for _ in 0..count {
        mappings.push(parse_mapping(br, channels, floor_count, residue_count)?);
    }
    Ok(mappings)
}

fn parse_mapping(
    br: &mut BitReader<'_>,
    channels: u8,
    floor_count: usize,
    residue_count: usize,
) -> YinliuResult<Mapping> {
    let mapping_type = br.read(16);
    if mapping_type != 0 {
        return Err(YinliuError::Unsupported(format!(
            "Vorbis mapping_type 不支持: {mapping_type}"
        )));
    }

    let submap_count = if br.read_flag() { br.read(4) + 1 } else { 1 };

    let mut coupling = Vec::new();
    if br.read_flag() {
        let steps = br.read(8) + 1;
        let ch_bits = ilog(u32::from(channels) - 1);
        for _ in 0..steps {
            let magnitude = br.read(ch_bits);
            let angle = br.read(ch_bits);
            if magnitude == angle
                || magnitude >= u32::from(channels)
                || angle >= u32::from(channels)
            {
                return Err(YinliuError::corrupt(
                    CorruptKind::BadReference,
                    format!("Vorbis coupling 声道非法: magnitude={magnitude}, angle={angle}"),
                ));
            }
            coupling.push((magnitude as u8, angle as u8));
        }
    }

    let reserved = br.read(2);
    if reserved != 0 {
        return Err(YinliuError::corrupt(
            CorruptKind::ReservedBits,
            "Vorbis mapping reserved bits 必须为 0",
        ));
    }

    let mut mux = vec![0u8; usize::from(channels)];
    if submap_count > 1 {
        for slot in &mut mux {
            let value = br.read(4);
            if value >= submap_count {
                return Err(YinliuError::corrupt(
                    CorruptKind::BadReference,
                    format!("Vorbis mapping mux 值越界: {value} >= {submap_count}"),
                ));
            }
            *slot = value as u8;
        }
    }

    let mut submaps = Vec::with_capacity(submap_count as usize);
    for _ in 0..submap_count {
        let _time_submap = br.read(8);
        let floor = br.read(8);
        let residue = br.read(8);
        if floor as usize >= floor_count || residue as usize >= residue_count {
            return Err(YinliuError::corrupt(
                CorruptKind::BadReference,
                format!("Vorbis mapping floor/residue 索引越界: floor={floor}, residue={residue}"),
            ));
        }
        submaps.push(Submap {
            floor: floor as u8,
            residue: residue as u8,
        });
    }

    Ok(Mapping {
        mux,
        submaps,
        coupling,
    })
}

fn parse_modes(br: &mut BitReader<'_>, mapping_count: usize) -> YinliuResult<Vec<Mode>> {
    let count = br.read(6) + 1;
    let mut modes = Vec::with_capacity(count as usize);
    for _ in 0..count {
        let long_block = br.read_flag();
        let window_type = br.read(16);
        let transform_type = br.read(16);
        if window_type != 0 || transform_type != 0 {
            return Err(YinliuError::Unsupported(format!(
                "Vorbis mode window/transform 不支持: window={window_type}, transform={transform_type}"
            )));
        }

        let mapping = br.read(8);
        if mapping as usize >= mapping_count {
            return Err(YinliuError::corrupt(
                CorruptKind::BadReference,
                format!("Vorbis mode mapping 索引越界: {mapping} >= {mapping_count}"),
            ));
        }
        modes.push(Mode {
            long_block,
            mapping: mapping as u8,
        });
    }
    Ok(modes)
}
