//! Reusable Terraform module sources, one per module kind.
//!
//! Every input a generated module block passes must be declared here as a
//! variable, otherwise `terraform validate` rejects the root module.

use super::ModuleKind;
use crate::provisioning::ManagedResourceKind;
use serde_json::{json, Value};

pub fn module_source(kind: ModuleKind) -> Value {
    match kind {
        ModuleKind::Namespace => namespace(),
        ModuleKind::Deployment => deployment(),
        ModuleKind::Service => service(),
        ModuleKind::Cloud(ManagedResourceKind::AwsDbInstance) => aws_db_instance(),
        ModuleKind::Cloud(ManagedResourceKind::AwsElasticache) => aws_elasticache(),
        ModuleKind::Cloud(ManagedResourceKind::GcpSqlInstance) => gcp_sql_instance(),
        ModuleKind::Cloud(ManagedResourceKind::GcpRedisInstance) => gcp_redis_instance(),
    }
}

fn namespace() -> Value {
    json!({
        "variable": {
            "name": { "type": "string" },
            "labels": { "type": "map(string)", "default": {} }
        },
        "resource": {
            "kubernetes_namespace": {
                "this": {
                    "metadata": { "name": "${var.name}", "labels": "${var.labels}" }
                }
            }
        },
        "output": {
            "name": { "value": "${kubernetes_namespace.this.metadata[0].name}" }
        }
    })
}

fn container_block(each: &str) -> Value {
    let v = |field: &str| format!("${{{}.value.{}}}", each, field);
    json!({
        "name": v("name"),
        "image": v("image"),
        "command": format!("${{try({}.value.command, null)}}", each),
        "args": format!("${{try({}.value.args, null)}}", each),
        "dynamic": {
            "port": {
                "for_each": format!("${{try({}.value.ports, [])}}", each),
                "content": {
                    "name": "${port.value.name}",
                    "container_port": "${port.value.port}"
                }
            },
            "env": {
                "for_each": format!("${{try({}.value.env, {{}})}}", each),
                "content": { "name": "${env.key}", "value": "${env.value}" }
            },
            "volume_mount": {
                "for_each": format!("${{try({}.value.volume_mounts, [])}}", each),
                "content": {
                    "name": "${volume_mount.value.name}",
                    "mount_path": "${volume_mount.value.mount_path}",
                    "read_only": "${volume_mount.value.read_only}"
                }
            },
            "resources": {
                "for_each": format!("${{try([{}.value.resources], [])}}", each),
                "content": {
                    "requests": "${resources.value.requests}",
                    "limits": "${resources.value.limits}"
                }
            }
        }
    })
}

fn deployment() -> Value {
    json!({
        "variable": {
            "name": { "type": "string" },
            "namespace": { "type": "string" },
            "replicas": { "type": "number", "default": 1 },
            "labels": { "type": "map(string)" },
            "containers": { "type": "any" },
            "init_containers": { "type": "any", "default": [] },
            "volumes": { "type": "any", "default": [] },
            "config_files": { "type": "map(string)", "default": {} }
        },
        "resource": {
            "kubernetes_config_map": {
                "this": {
                    "count": "${length(var.config_files) > 0 ? 1 : 0}",
                    "metadata": {
                        "name": "${var.name}-config",
                        "namespace": "${var.namespace}"
                    },
                    "data": "${var.config_files}"
                }
            },
            "kubernetes_deployment": {
                "this": {
                    "metadata": {
                        "name": "${var.name}",
                        "namespace": "${var.namespace}",
                        "labels": "${var.labels}",
                        "annotations": {
                            "stackup/config-hash": "${sha256(jsonencode(var.config_files))}"
                        }
                    },
                    "spec": {
                        "replicas": "${var.replicas}",
                        "selector": { "match_labels": "${var.labels}" },
                        "template": {
                            "metadata": {
                                "labels": "${var.labels}",
                                "annotations": {
                                    "stackup/config-hash": "${sha256(jsonencode(var.config_files))}"
                                }
                            },
                            "spec": {
                                "dynamic": {
                                    "init_container": {
                                        "for_each": "${var.init_containers}",
                                        "content": container_block("init_container")
                                    },
                                    "container": {
                                        "for_each": "${var.containers}",
                                        "content": container_block("container")
                                    },
                                    "volume": {
                                        "for_each": "${var.volumes}",
                                        "content": {
                                            "name": "${volume.value.name}",
                                            "dynamic": {
                                                "config_map": {
                                                    "for_each": "${try(volume.value.config_map, null) == null ? [] : [volume.value.config_map]}",
                                                    "content": { "name": "${config_map.value}" }
                                                },
                                                "empty_dir": {
                                                    "for_each": "${try(volume.value.empty_dir, false) ? [1] : []}",
                                                    "content": {}
                                                }
                                            }
                                        }
                                    }
                                }
                            }
                        }
                    },
                    "depends_on": ["kubernetes_config_map.this"]
                }
            }
        },
        "output": {
            "name": { "value": "${kubernetes_deployment.this.metadata[0].name}" }
        }
    })
}

fn service() -> Value {
    json!({
        "variable": {
            "name": { "type": "string" },
            "namespace": { "type": "string" },
            "selector": { "type": "map(string)" },
            "service_type": { "type": "string", "default": "ClusterIP" },
            "ports": { "type": "any" },
            "wait_for_load_balancer": { "type": "bool", "default": false }
        },
        "resource": {
            "kubernetes_service": {
                "this": {
                    "metadata": { "name": "${var.name}", "namespace": "${var.namespace}" },
                    "spec": {
                        "selector": "${var.selector}",
                        "type": "${var.service_type}",
                        "dynamic": {
                            "port": {
                                "for_each": "${var.ports}",
                                "content": {
                                    "name": "${port.value.name}",
                                    "port": "${port.value.port}",
                                    "target_port": "${port.value.target_port}"
                                }
                            }
                        }
                    },
                    "wait_for_load_balancer": "${var.wait_for_load_balancer}"
                }
            }
        },
        "output": {
            "cluster_address": {
                "value": "${kubernetes_service.this.metadata[0].name}.${var.namespace}.svc.cluster.local"
            },
            "load_balancer_address": {
                "value": "${try(kubernetes_service.this.status[0].load_balancer[0].ingress[0].hostname, kubernetes_service.this.status[0].load_balancer[0].ingress[0].ip, \"\")}"
            }
        }
    })
}

fn aws_db_instance() -> Value {
    json!({
        "variable": {
            "identifier": { "type": "string" },
            "engine": { "type": "string" },
            "engine_version": { "type": "string" },
            "instance_class": { "type": "string" },
            "allocated_storage": { "type": "number" },
            "port": { "type": "number" },
            "db_name": { "type": "string", "default": null },
            "username": { "type": "string", "default": "postgres" },
            "password": { "type": "string", "default": null, "sensitive": true }
        },
        "resource": {
            "aws_db_instance": {
                "this": {
                    "identifier": "${var.identifier}",
                    "engine": "${var.engine}",
                    "engine_version": "${var.engine_version}",
                    "instance_class": "${var.instance_class}",
                    "allocated_storage": "${var.allocated_storage}",
                    "port": "${var.port}",
                    "db_name": "${var.db_name}",
                    "username": "${var.username}",
                    "password": "${var.password}",
                    "manage_master_user_password": "${var.password == null ? true : null}",
                    "skip_final_snapshot": true,
                    "publicly_accessible": false
                }
            }
        },
        "output": {
            "endpoint": { "value": "${aws_db_instance.this.endpoint}" }
        }
    })
}

fn aws_elasticache() -> Value {
    json!({
        "variable": {
            "cluster_id": { "type": "string" },
            "engine_version": { "type": "string" },
            "node_type": { "type": "string" },
            "port": { "type": "number" }
        },
        "resource": {
            "aws_elasticache_cluster": {
                "this": {
                    "cluster_id": "${var.cluster_id}",
                    "engine": "redis",
                    "engine_version": "${var.engine_version}",
                    "node_type": "${var.node_type}",
                    "num_cache_nodes": 1,
                    "port": "${var.port}"
                }
            }
        },
        "output": {
            "endpoint": {
                "value": "${aws_elasticache_cluster.this.cache_nodes[0].address}:${aws_elasticache_cluster.this.cache_nodes[0].port}"
            }
        }
    })
}

fn gcp_sql_instance() -> Value {
    json!({
        "variable": {
            "name": { "type": "string" },
            "database_version": { "type": "string" },
            "tier": { "type": "string" },
            "db_name": { "type": "string", "default": null },
            "username": { "type": "string", "default": null },
            "password": { "type": "string", "default": null, "sensitive": true }
        },
        "resource": {
            "google_sql_database_instance": {
                "this": {
                    "name": "${var.name}",
                    "database_version": "${var.database_version}",
                    "deletion_protection": false,
                    "settings": { "tier": "${var.tier}" }
                }
            },
            "google_sql_database": {
                "this": {
                    "count": "${var.db_name == null ? 0 : 1}",
                    "name": "${var.db_name}",
                    "instance": "${google_sql_database_instance.this.name}"
                }
            },
            "google_sql_user": {
                "this": {
                    "count": "${var.username == null ? 0 : 1}",
                    "name": "${var.username}",
                    "password": "${var.password}",
                    "instance": "${google_sql_database_instance.this.name}"
                }
            }
        },
        "output": {
            "endpoint": {
                "value": "${google_sql_database_instance.this.first_ip_address}:5432"
            }
        }
    })
}

fn gcp_redis_instance() -> Value {
    json!({
        "variable": {
            "name": { "type": "string" },
            "redis_version": { "type": "string" },
            "memory_size_gb": { "type": "number" }
        },
        "resource": {
            "google_redis_instance": {
                "this": {
                    "name": "${var.name}",
                    "redis_version": "${var.redis_version}",
                    "memory_size_gb": "${var.memory_size_gb}"
                }
            }
        },
        "output": {
            "endpoint": {
                "value": "${google_redis_instance.this.host}:${google_redis_instance.this.port}"
            }
        }
    })
}
