//! Vorbis floor: 频谱包络的解码与渲染.
//!
//! 解码阶段从位流读出包络参数, 越过 packet 末尾时报告"不存在", 该声道本块输出静音.
//! 渲染阶段把包络作为逐系数的乘性缩放应用到已重建的 residue 上.

use std::f32::consts::PI;

use yinliu_core::{CorruptKind, YinliuError, YinliuResult};

use super::bitreader::{BitReader, ilog};
use super::codebook::Codebook;

/// floor1 X 坐标数量上限
pub(crate) const FLOOR1_MAX_VALUES: usize = 65;

const FLOOR1_RANGE: [i32; 4] = [256, 128, 86, 64];
const FLOOR1_Y_BITS: [u32; 4] = [8, 7, 7, 6];

#[derive(Debug, Clone)]
pub(crate) enum Floor {
    Zero(Floor0),
    One(Floor1),
}

#[derive(Debug, Clone)]
pub(crate) struct Floor0 {
    order: usize,
    rate: u32,
    bark_map_size: u32,
    amplitude_bits: u32,
    amplitude_offset: u32,
    books: Vec<u8>,
}

#[derive(Debug, Clone)]
struct Floor1Class {
    dimensions: usize,
    subclass_bits: u32,
    master_book: Option<u8>,
    /// 子 codebook, None 表示该子类不编码 Y 值
    sub_books: Vec<Option<u8>>,
}

#[derive(Debug, Clone)]
pub(crate) struct Floor1 {
    partition_classes: Vec<u8>,
    classes: Vec<Floor1Class>,
    multiplier: i32,
    x_list: Vec<u32>,
    /// 按 X 升序排列的下标
    sorted: Vec<u8>,
    /// 下标 i (i >= 2) 的低/高邻居
    neighbors: Vec<(u8, u8)>,
}

/// 单声道单 packet 的 floor 解码结果, 跨 packet 复用内存
#[derive(Debug, Clone, Default)]
pub(crate) struct DecodedFloor {
    cos_coeffs: Vec<f32>,
    linear_scale: f32,
    linear_offset: f32,
    raw_y: Vec<i32>,
    final_y: Vec<i32>,
    step2: Vec<bool>,
}

impl Floor {
    pub(crate) fn parse(br: &mut BitReader<'_>, codebooks: &[Codebook]) -> YinliuResult<Self> {
        let floor_type = br.read(16);
        match floor_type {
            0 => Floor0::parse(br, codebooks).map(Self::Zero),
            1 => Floor1::parse(br, codebooks).map(Self::One),
            _ => Err(YinliuError::Unsupported(format!(
                "Vorbis floor_type 不支持: {floor_type}"
            ))),
        }
    }

    /// 解码本 packet 的包络参数, 返回 false 表示包络不存在
    pub(crate) fn decode(
        &self,
        br: &mut BitReader<'_>,
        codebooks: &[Codebook],
        out: &mut DecodedFloor,
    ) -> YinliuResult<bool> {
        match self {
            Self::Zero(f) => f.decode(br, codebooks, out),
            Self::One(f) => Ok(f.decode(br, codebooks, out)),
        }
    }

    /// 把包络乘到 `dst` 上, `dst.len()` 为半块长度
    pub(crate) fn render(&self, decoded: &DecodedFloor, dst: &mut [f32]) {
        match self {
            Self::Zero(f) => f.render(decoded, dst),
            Self::One(f) => f.render(decoded, dst),
        }
    }
}

fn book_ref(raw: u32, codebooks: &[Codebook], what: &str) -> YinliuResult<u8> {
    if raw as usize >= codebooks.len() {
        return Err(YinliuError::corrupt(
            CorruptKind::BadReference,
            format!("Vorbis {what} 引用的 codebook 越界: {raw} >= {}", codebooks.len()),
        ));
    }
    Ok(raw as u8)
}

impl Floor0 {
    fn parse(br: &mut BitReader<'_>, codebooks: &[Codebook]) -> YinliuResult<Self> {
        let order = br.read(8) as usize;
        let rate = br.read(16);
        let bark_map_size = br.read(16);
        let amplitude_bits = br.read(6);
        let amplitude_offset = br.read(8);
        let book_count = br.read(4) + 1;

        if order < 2 {
            return Err(YinliuError::corrupt(
                CorruptKind::InvalidField,
                format!("Vorbis floor0 order 非法: {order}"),
            ));
        }
        if rate == 0 || bark_map_size == 0 {
            return Err(YinliuError::corrupt(
                CorruptKind::InvalidField,
                format!("Vorbis floor0 rate/bark_map_size 不能为 0: rate={rate}, bark={bark_map_size}"),
            ));
        }

        let books = (0..book_count)
            .map(|_| book_ref(br.read(8), codebooks, "floor0"))
            .collect::<YinliuResult<Vec<_>>>()?;

        Ok(Self {
            order,
            rate,
            bark_map_size,
            amplitude_bits,
            amplitude_offset,
            books,
        })
    }

    fn decode(
        &self,
        br: &mut BitReader<'_>,
        codebooks: &[Codebook],
        out: &mut DecodedFloor,
    ) -> YinliuResult<bool> {
        let amplitude = br.read_u64(self.amplitude_bits);
        if amplitude == 0 || br.is_eop() {
            return Ok(false);
        }

        let book_index = br.read(ilog(self.books.len() as u32)) as usize;
        let Some(&book) = self.books.get(book_index) else {
            return Err(YinliuError::corrupt(
                CorruptKind::BadReference,
                format!("Vorbis floor0 packet 中的 codebook 序号越界: {book_index}"),
            ));
        };
        let vq = codebooks[usize::from(book)].vq()?;

        out.cos_coeffs.clear();
        let mut last = 0.0f32;
        while out.cos_coeffs.len() < self.order {
            let values = vq.decode(br);
            // 最后一次抽取可能超出 order, 多余分量直接丢弃
            for &v in values {
                out.cos_coeffs.push((last + v).cos());
                if out.cos_coeffs.len() >= self.order {
                    break;
                }
            }
            last += values.last().copied().unwrap_or(0.0);
        }

        if br.is_eop() {
            return Ok(false);
        }

        let max_amplitude = ((1u64 << self.amplitude_bits) - 1) as f32;
        out.linear_scale = 0.115_129_25 * amplitude as f32 * self.amplitude_offset as f32
            / max_amplitude
            * 2f32.powi(-((self.order >> 1) as i32));
        out.linear_offset = -0.115_129_25 * self.amplitude_offset as f32;
        Ok(true)
    }

    fn render(&self, decoded: &DecodedFloor, dst: &mut [f32]) {
        let n = dst.len();
        if n == 0 {
            return;
        }
        let arg_scale = self.rate as f32 * 0.5 / n as f32;
        let val_scale = self.bark_map_size as f32 / bark(0.5 * self.rate as f32);
        let map_ceiling = self.bark_map_size as f32 - 1.0;
        let map = |i: usize| (bark(i as f32 * arg_scale) * val_scale).floor().min(map_ceiling);

        let w_scale = PI / self.bark_map_size as f32;
        let terms = self.order >> 1;
        let coeffs = &decoded.cos_coeffs;

        let mut i = 0usize;
        let mut map_last = map(0);
        while i < n {
            let cos_w = (map_last * w_scale).cos();
            let (mut p, mut q) = if self.order & 1 != 0 {
                (1.0 - cos_w * cos_w, 0.25f32)
            } else {
                ((1.0 - cos_w) * 0.5, (1.0 + cos_w) * 0.5)
            };
            for t in 0..terms {
                let pd = coeffs[2 * t + 1] - cos_w;
                let qd = coeffs[2 * t] - cos_w;
                p *= pd * pd;
                q *= qd * qd;
            }
            if self.order & 1 != 0 {
                let qd = coeffs[2 * terms] - cos_w;
                q *= 4.0 * qd * qd;
            }

            let value = (decoded.linear_scale / (p + q).sqrt() + decoded.linear_offset).exp();

            // bark 映射单调不减, 同一映射值的系数共用一个增益
            loop {
                dst[i] *= value;
                i += 1;
                if i >= n {
                    break;
                }
                let map_next = map(i);
                if map_next != map_last {
                    map_last = map_next;
                    break;
                }
            }
        }
    }
}

fn bark(x: f32) -> f32 {
    13.1 * (0.00074 * x).atan() + 2.24 * (0.000_000_018_5 * (x * x)).atan() + 0.0001 * x
}

impl Floor1 {
    fn parse(br: &mut BitReader<'_>, codebooks: &[Codebook]) -> YinliuResult<Self> {
        let partitions = br.read(5) as usize;
        let partition_classes: Vec<u8> = (0..partitions).map(|_| br.read(4) as u8).collect();
        let class_count = partition_classes
            .iter()
            .map(|&c| usize::from(c) + 1)
            .max()
            .unwrap_or(0);

        let mut classes = Vec::with_capacity(class_count);
        for _ in 0..class_count {
            let dimensions = br.read(3) as usize + 1;
            let subclass_bits = br.read(2);
            let master_book = if subclass_bits > 0 {
                Some(book_ref(br.read(8), codebooks, "floor1 master")?)
            } else {
                None
            };
            let sub_books = (0..1u32 << subclass_bits)
                .map(|_| match br.read(8) {
                    0 => Ok(None),
                    raw => book_ref(raw - 1, codebooks, "floor1 subclass").map(Some),
                })
                .collect::<YinliuResult<Vec<_>>>()?;
            classes.push(Floor1Class {
                dimensions,
                subclass_bits,
                master_book,
                sub_books,
            });
        }

        let multiplier = br.read(2) as i32 + 1;
        let range_bits = br.read(4);

        let mut x_list = vec![0u32, 1 << range_bits];
        for &class in &partition_classes {
            for _ in 0..classes[usize::from(class)].dimensions {
                if x_list.len() >= FLOOR1_MAX_VALUES {
                    return Err(YinliuError::corrupt(
                        CorruptKind::LimitExceeded,
                        format!("Vorbis floor1 X 坐标超过 {FLOOR1_MAX_VALUES} 个"),
                    ));
                }
                x_list.push(br.read(range_bits));
            }
        }

        let (sorted, neighbors) = build_x_tables(&x_list)?;

        Ok(Self {
            partition_classes,
            classes,
            multiplier,
            x_list,
            sorted,
            neighbors,
        })
    }

    fn decode(&self, br: &mut BitReader<'_>, codebooks: &[Codebook], out: &mut DecodedFloor) -> bool {
        if !br.read_flag() || br.is_eop() {
            return false;
        }

        let m = (self.multiplier - 1) as usize;
        let range = FLOOR1_RANGE[m];
        let y_bits = FLOOR1_Y_BITS[m];

        let raw_y = &mut out.raw_y;
        raw_y.clear();
        raw_y.push((br.read(y_bits) as i32).min(range - 1));
        raw_y.push((br.read(y_bits) as i32).min(range - 1));

        for &class in &self.partition_classes {
            let class = &self.classes[usize::from(class)];
            let mask = (1u32 << class.subclass_bits) - 1;
            let mut cval = match class.master_book {
                Some(book) => codebooks[usize::from(book)].decode_index(br),
                None => 0,
            };
            for _ in 0..class.dimensions {
                let sub = class.sub_books[(cval & mask) as usize];
                cval >>= class.subclass_bits;
                raw_y.push(match sub {
                    Some(book) => codebooks[usize::from(book)].decode_index(br) as i32,
                    None => 0,
                });
            }
        }

        if br.is_eop() {
            return false;
        }

        let count = self.x_list.len();
        out.final_y.clear();
        out.final_y.resize(count, 0);
        out.step2.clear();
        out.step2.resize(count, false);
        out.final_y[0] = out.raw_y[0];
        out.final_y[1] = out.raw_y[1];
        out.step2[0] = true;
        out.step2[1] = true;

        for i in 2..count {
            let (lo, hi) = self.neighbors[i];
            let (lo, hi) = (usize::from(lo), usize::from(hi));
            let predicted = render_point(
                self.x_list[lo] as i32,
                out.final_y[lo],
                self.x_list[hi] as i32,
                out.final_y[hi],
                self.x_list[i] as i32,
            );
            let val = out.raw_y[i];
            let y = if val != 0 {
                out.step2[lo] = true;
                out.step2[hi] = true;
                out.step2[i] = true;
                unwrap_y(val, predicted, range)
            } else {
                predicted
            };
            out.final_y[i] = y.clamp(0, range - 1);
        }
        true
    }

    fn render(&self, decoded: &DecodedFloor, dst: &mut [f32]) {
        let n = dst.len();
        let mut lx = 0usize;
        let mut ly = decoded.final_y[usize::from(self.sorted[0])] * self.multiplier;
        let mut hx = 0usize;
        let mut hy = 0i32;

        for &idx in &self.sorted[1..] {
            let idx = usize::from(idx);
            if decoded.step2[idx] {
                hy = decoded.final_y[idx] * self.multiplier;
                hx = self.x_list[idx] as usize;
                render_line(lx, ly, hx, hy, dst);
                lx = hx;
                ly = hy;
            }
        }

        if hx < n {
            let v = FLOOR1_INVERSE_DB_TABLE[(hy & 255) as usize];
            for s in &mut dst[hx..] {
                *s *= v;
            }
        }
    }

    #[cfg(test)]
    pub(crate) fn from_x_list(x_list: Vec<u32>, multiplier: i32) -> YinliuResult<Self> {
        let (sorted, neighbors) = build_x_tables(&x_list)?;
        Ok(Self {
            partition_classes: Vec::new(),
            classes: Vec::new(),
            multiplier,
            x_list,
            sorted,
            neighbors,
        })
    }
}

/// 计算排序序与低/高邻居, X 坐标必须两两不同
fn build_x_tables(x_list: &[u32]) -> YinliuResult<(Vec<u8>, Vec<(u8, u8)>)> {
    let mut sorted: Vec<u8> = (0..x_list.len() as u8).collect();
    sorted.sort_by_key(|&i| x_list[usize::from(i)]);
    if sorted
        .windows(2)
        .any(|w| x_list[usize::from(w[0])] == x_list[usize::from(w[1])])
    {
        return Err(YinliuError::corrupt(
            CorruptKind::InvalidField,
            "Vorbis floor1 X 坐标重复",
        ));
    }

    let mut neighbors = vec![(0u8, 1u8); x_list.len()];
    for (i, slot) in neighbors.iter_mut().enumerate().skip(2) {
        let xi = x_list[i];
        let mut lo = 0usize;
        let mut hi = 1usize;
        for (j, &xj) in x_list.iter().enumerate().take(i) {
            if xj < xi && xj > x_list[lo] {
                lo = j;
            }
            if xj > xi && xj < x_list[hi] {
                hi = j;
            }
        }
        *slot = (lo as u8, hi as u8);
    }
    Ok((sorted, neighbors))
}

fn render_point(x0: i32, y0: i32, x1: i32, y1: i32, x: i32) -> i32 {
    let dy = y1 - y0;
    let adx = x1 - x0;
    let off = dy.abs() * (x - x0) / adx;
    if dy < 0 { y0 - off } else { y0 + off }
}

/// 按余量规则把残差还原为最终 Y 值, 余量不足的一侧被跳过
fn unwrap_y(val: i32, predicted: i32, range: i32) -> i32 {
    let highroom = range - predicted;
    let lowroom = predicted;
    let room = 2 * highroom.min(lowroom);
    if val >= room {
        if highroom > lowroom {
            predicted + val - lowroom
        } else {
            predicted - val + highroom - 1
        }
    } else if val & 1 != 0 {
        predicted - (val + 1) / 2
    } else {
        predicted + val / 2
    }
}

/// 在 [x0, x1) 上按整数直线插值乘以逆 dB 表, 超过 `dst` 末尾的部分被裁掉
fn render_line(x0: usize, y0: i32, x1: usize, y1: i32, dst: &mut [f32]) {
    if x0 >= dst.len() || x1 <= x0 {
        return;
    }
    let dy = y1 - y0;
    let adx = (x1 - x0) as i32;
    let base = dy / adx;
    let ady = dy.abs() - base.abs() * adx;
    let sy = if dy < 0 { -1 } else { 1 };
    let end = x1.min(dst.len());

    let mut y = y0;
    let mut err = 0i32;
    dst[x0] *= FLOOR1_INVERSE_DB_TABLE[(y & 255) as usize];
    for s in &mut dst[x0 + 1..end] {
        err += ady;
        if err >= adx {
            err -= adx;
            y += sy;
        }
        y += base;
        *s *= FLOOR1_INVERSE_DB_TABLE[(y & 255) as usize];
    }
}

#[allow(clippy::excessive_precision)]
static FLOOR1_INVERSE_DB_TABLE: &[f32; 256] = &[
    1.0649863e-07, 1.1341951e-07, 1.2079015e-07, 1.2863978e-07,
    1.3699951e-07, 1.4590251e-07, 1.5538408e-07, 1.6548181e-07,
    1.7623575e-07, 1.8768855e-07, 1.9988561e-07, 2.1287530e-07,
    2.2670913e-07, 2.4144197e-07, 2.5713223e-07, 2.7384213e-07,
    2.9163793e-07, 3.1059021e-07, 3.3077411e-07, 3.5226968e-07,
    3.7516214e-07, 3.9954229e-07, 4.2550680e-07, 4.5315863e-07,
    4.8260743e-07, 5.1396998e-07, 5.4737065e-07, 5.8294187e-07,
    6.2082472e-07, 6.6116941e-07, 7.0413592e-07, 7.4989464e-07,
    7.9862701e-07, 8.5052630e-07, 9.0579828e-07, 9.6466216e-07,
    1.0273513e-06, 1.0941144e-06, 1.1652161e-06, 1.2409384e-06,
    1.3215816e-06, 1.4074654e-06, 1.4989305e-06, 1.5963394e-06,
    1.7000785e-06, 1.8105592e-06, 1.9282195e-06, 2.0535261e-06,
    2.1869758e-06, 2.3290978e-06, 2.4804557e-06, 2.6416497e-06,
    2.8133190e-06, 2.9961443e-06, 3.1908506e-06, 3.3982101e-06,
    3.6190449e-06, 3.8542308e-06, 4.1047004e-06, 4.3714470e-06,
    4.6555282e-06, 4.9580707e-06, 5.2802740e-06, 5.6234160e-06,
    5.9888572e-06, 6.3780469e-06, 6.7925283e-06, 7.2339451e-06,
    7.7040476e-06, 8.2047000e-06, 8.7378876e-06, 9.3057248e-06,
    9.9104632e-06, 1.0554501e-05, 1.1240392e-05, 1.1970856e-05,
    1.2748789e-05, 1.3577278e-05, 1.4459606e-05, 1.5399272e-05,
    1.6400004e-05, 1.7465768e-05, 1.8600792e-05, 1.9809576e-05,
    2.1096914e-05, 2.2467911e-05, 2.3928002e-05, 2.5482978e-05,
    2.7139006e-05, 2.8902651e-05, 3.0780908e-05, 3.2781225e-05,
    3.4911534e-05, 3.7180282e-05, 3.9596466e-05, 4.2169667e-05,
    4.4910090e-05, 4.7828601e-05, 5.0936773e-05, 5.4246931e-05,
    5.7772202e-05, 6.1526565e-05, 6.5524908e-05, 6.9783085e-05,
    7.4317983e-05, 7.9147585e-05, 8.4291040e-05, 8.9768747e-05,
    9.5602426e-05, 1.0181521e-04, 1.0843174e-04, 1.1547824e-04,
    1.2298267e-04, 1.3097477e-04, 1.3948625e-04, 1.4855085e-04,
    1.5820453e-04, 1.6848555e-04, 1.7943469e-04, 1.9109536e-04,
    2.0351382e-04, 2.1673929e-04, 2.3082423e-04, 2.4582449e-04,
    2.6179955e-04, 2.7881275e-04, 2.9693158e-04, 3.1622787e-04,
    3.3677814e-04, 3.5866388e-04, 3.8197188e-04, 4.0679456e-04,
    4.3323036e-04, 4.6138411e-04, 4.9136745e-04, 5.2329927e-04,
    5.5730621e-04, 5.9352311e-04, 6.3209358e-04, 6.7317058e-04,
    7.1691700e-04, 7.6350630e-04, 8.1312324e-04, 8.6596457e-04,
    9.2223983e-04, 9.8217216e-04, 1.0459992e-03, 1.1139742e-03,
    1.1863665e-03, 1.2634633e-03, 1.3455702e-03, 1.4330129e-03,
    1.5261382e-03, 1.6253153e-03, 1.7309374e-03, 1.8434235e-03,
    1.9632195e-03, 2.0908006e-03, 2.2266726e-03, 2.3713743e-03,
    2.5254795e-03, 2.6895994e-03, 2.8643847e-03, 3.0505286e-03,
    3.2487691e-03, 3.4598925e-03, 3.6847358e-03, 3.9241906e-03,
    4.1792066e-03, 4.4507950e-03, 4.7400328e-03, 5.0480668e-03,
    5.3761186e-03, 5.7254891e-03, 6.0975636e-03, 6.4938176e-03,
    6.9158225e-03, 7.3652516e-03, 7.8438871e-03, 8.3536271e-03,
    8.8964928e-03, 9.4746370e-03, 1.0090352e-02, 1.0746080e-02,
    1.1444421e-02, 1.2188144e-02, 1.2980198e-02, 1.3823725e-02,
    1.4722068e-02, 1.5678791e-02, 1.6697687e-02, 1.7782797e-02,
    1.8938423e-02, 2.0169149e-02, 2.1479854e-02, 2.2875735e-02,
    2.4362330e-02, 2.5945531e-02, 2.7631618e-02, 2.9427276e-02,
    3.1339626e-02, 3.3376252e-02, 3.5545228e-02, 3.7855157e-02,
    4.0315199e-02, 4.2935108e-02, 4.5725273e-02, 4.8696758e-02,
    5.1861348e-02, 5.5231591e-02, 5.8820850e-02, 6.2643361e-02,
    6.6714279e-02, 7.1049749e-02, 7.5666962e-02, 8.0584227e-02,
    8.5821044e-02, 9.1398179e-02, 9.7337747e-02, 1.0366330e-01,
    1.1039993e-01, 1.1757434e-01, 1.2521498e-01, 1.3335215e-01,
    1.4201813e-01, 1.5124727e-01, 1.6107617e-01, 1.7154380e-01,
    1.8269168e-01, 1.9456402e-01, 2.0720788e-01, 2.2067342e-01,
    2.3501402e-01, 2.5028656e-01, 2.6655159e-01, 2.8387361e-01,
    3.0232132e-01, 3.2196786e-01, 3.4289114e-01, 3.6517414e-01,
    3.8890521e-01, 4.1417847e-01, 4.4109412e-01, 4.6975890e-01,
    5.0028648e-01, 5.3279791e-01, 5.6742212e-01, 6.0429640e-01,
    6.4356699e-01, 6.8538959e-01, 7.2993007e-01, 7.7736504e-01,
    8.2788260e-01, 8.8168307e-01, 9.3897980e-01, 1.0,
];
