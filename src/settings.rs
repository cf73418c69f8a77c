// 该文件是 Shanan （山南西风） 项目的一部分。
// src/settings.rs - 数据目录布局与训练默认参数
//
// 本文件根据 Apache 许可证第 2.0 版（以下简称“许可证”）授权使用；
// 除非遵守该许可证条款，否则您不得使用本文件。
// 您可通过以下网址获取许可证副本：
// http://www.apache.org/licenses/LICENSE-2.0
// 除非适用法律要求或书面同意，根据本许可协议分发的软件均按“原样”提供，
// 不附带任何形式的明示或暗示的保证或条件。
// 有关许可权限与限制的具体条款，请参阅本许可协议。
//
// Copyright (C) 2026 Johann Li <me@qinka.pro>, Wareless Group

pub const DEFAULT_LOCAL_DATA_DIR: &str = "data";
pub const DEFAULT_S3_DATA_DIR: &str = "data";
pub const DEFAULT_S3_ENDPOINT: &str = "file:///mnt/s3";

// 目录布局
pub const IMAGE_DIR_NAME: &str = "images";
pub const ANNOTATION_DIR_NAME: &str = "annotations";
pub const MANIFEST_DIR_NAME: &str = "manifests";
pub const MODEL_STATE_DIR_NAME: &str = "models";
pub const LOGS_DIR_NAME: &str = "logs";
pub const LABEL_FILE_NAME: &str = "labels.txt";

// 文件类型
pub const IMAGE_FILE_TYPE: &str = "jpg";
pub const ANNOTATION_FILE_TYPE: &str = "xml";
pub const MANIFEST_FILE_TYPE: &str = "json";
pub const MODEL_STATE_FILE_TYPE: &str = "bin";
pub const LOG_IMAGE_FILE_TYPE: &str = "jpg";

/// 标注阶段被判定为无效的图像，其清单条目中的标注文件名
pub const INVALID_ANNOTATION_FILE_IDENTIFIER: &str = "invalid";

/// 自动插入到标签序列首位的背景类
pub const BACKGROUND_LABEL: &str = "background";

// 训练超参数
pub const DEFAULT_NUM_EPOCHS: usize = 10;
pub const DEFAULT_LEARNING_RATE: f64 = 0.005;
pub const DEFAULT_MOMENTUM: f64 = 0.9;
pub const DEFAULT_WEIGHT_DECAY: f32 = 0.0005;
pub const DEFAULT_LR_STEP_SIZE: usize = 3;
pub const DEFAULT_LR_GAMMA: f64 = 0.1;
pub const DEFAULT_PRINT_FREQ: usize = 10;
pub const DEFAULT_WARMUP_FACTOR: f64 = 1.0 / 1000.0;
pub const DEFAULT_WARMUP_ITERS: usize = 1000;
pub const DEFAULT_INPUT_SIZE: u32 = 128;
pub const DEFAULT_MAX_BOXES: usize = 16;
pub const TEST_SPLIT_FRACTION: f64 = 0.2;
pub const HORIZONTAL_FLIP_PROB: f64 = 0.5;

// 评估统计向量中的位置
pub const AVERAGE_PRECISION_STAT_INDEX: usize = 0;
pub const AVERAGE_RECALL_STAT_INDEX: usize = 8;
